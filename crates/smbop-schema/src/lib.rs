//! Resource intents, the shared configuration document, and operator config for smbop.
//!
//! This crate defines the schema layer: user-submitted resource manifests
//! (`ResourceManifest`) and their typed specs (`SmbShareSpec`,
//! `SmbSecurityConfigSpec`, `SmbCommonConfigSpec`), the persisted
//! `ConfigDocument` read by the in-container startup tooling, deterministic
//! server-group identity (`resolve_group_key`), and the immutable
//! `OperatorConfig`.

pub mod config;
pub mod document;
pub mod identity;
pub mod manifest;
pub mod resources;
pub mod types;
pub mod validate;

pub use config::{parse_config_str, ConfigError, OperatorConfig};
pub use document::{
    yes_no, ConfigDocument, ConfigSection, DocumentError, FeatureFlag, GroupEntry, OptionSet,
    PermissionsConfig, SmbOptions, UserEntry,
};
pub use identity::{implicit_group_key, resolve_group_key};
pub use manifest::{parse_manifest_file, parse_manifest_str, ResourceManifest, SchemaError};
pub use resources::{
    AvailabilityMode, ClaimTemplate, DataSpec, DnsRegistration, GroupMode, IdmapBackend,
    IdmapDomain, JoinSource, NodeAffinityTerm, PodSettings, PublishMode, ScalingSpec,
    SecretKeyRef, SecurityMode, ShareState, ShareStatus, SmbCommonConfigSpec,
    SmbSecurityConfigSpec, SmbShareSpec, StorageSpec,
};
pub use types::{GlobalKey, GroupKey, ObjectKind, ShareKey, Uid};
pub use validate::{validate_grouping, validate_name, validate_security, validate_share};
