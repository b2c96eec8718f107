//! Configuration planning and convergence engine for smbop.
//!
//! This crate ties the schema and store layers together. The planner merges
//! independently submitted shares into one `ConfigDocument` per namespace,
//! allocating ID-map ranges and rejecting unsafe merges through the
//! compatibility checker. The `Reconciler` drives each share toward its
//! desired state one store mutation per call, with a pure `plan` step that
//! decides the next action from an observed snapshot, and tears shares down
//! through a finalizer.

pub mod compat;
pub mod concurrency;
pub mod events;
pub mod idmap;
pub mod instance;
pub mod lifecycle;
pub mod planner;
pub mod reconcile;
pub mod resources;

pub use compat::{check_compatible, Incompatibility};
pub use concurrency::{install_signal_handler, shutdown_requested};
pub use events::{
    event_name, list_events, record_event, EventRecord, InvolvedObject,
    REASON_INVALID_CONFIGURATION,
};
pub use idmap::{allocate_idmap, idmap_options, IdmapEntry};
pub use instance::{resolve_dependency, Dependency, InstanceConfiguration, Resolved};
pub use lifecycle::validate_transition;
pub use planner::{prune, update, PlanError};
pub use reconcile::{
    plan, Action, Decision, Observed, Outcome, Peer, Reconciler, RunReport, FINALIZER,
    MAX_TRANSIENT_RETRIES,
};

use smbop_schema::ObjectKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(#[from] smbop_store::StoreError),
    #[error("schema error: {0}")]
    Schema(#[from] smbop_schema::SchemaError),
    #[error("planning error: {0}")]
    Plan(#[from] PlanError),
    #[error("configuration document in namespace '{namespace}' is unusable: {reason}")]
    MalformedDocument { namespace: String, reason: String },
    #[error("{kind} '{name}' is referenced but does not exist")]
    MissingDependency { kind: ObjectKind, name: String },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Errors worth retrying after a fresh fetch.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Store(e) if e.is_transient())
    }
}
