//! Per-share convergence.
//!
//! Each call to [`Reconciler::process`] fetches a fresh snapshot of
//! everything one share depends on, asks the pure [`plan`] step for the next
//! action, and applies at most that one mutation. A crash between any two
//! calls loses nothing: the next call re-derives the same next step from the
//! store alone.

use crate::compat::check_compatible;
use crate::events::{record_event, REASON_INVALID_CONFIGURATION};
use crate::instance::{
    claim_name_for, resolve_dependency, resolve_spec, share_key_for, Dependency,
    InstanceConfiguration,
};
use crate::lifecycle::validate_transition;
use crate::planner::{self, PlanError};
use crate::resources::{
    claim_object, desired_replicas, document_data, document_key, document_object,
    read_document, service_object, workload_kind_for, workload_object,
};
use crate::CoreError;
use smbop_schema::{
    resolve_group_key, ConfigDocument, GroupKey, ObjectKind, OperatorConfig, ShareKey,
    ShareState, ShareStatus, SmbCommonConfigSpec, SmbSecurityConfigSpec, SmbShareSpec,
};
use smbop_store::{Object, ObjectKey, ObjectStore, OwnerReference, StoreError};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Finalizer guarding a share until its document entries are pruned.
pub const FINALIZER: &str = "smbop.io/finalizer";

/// Consecutive transient failures tolerated by [`Reconciler::run_until_done`].
pub const MAX_TRANSIENT_RETRIES: u32 = 5;
const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing left to do until the inputs change.
    Done,
    /// A mutation was made; call again to continue.
    Requeue,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => write!(f, "done"),
            Outcome::Requeue => write!(f, "requeue"),
        }
    }
}

/// Another live share assigned to the same group, with the configs it
/// references. Compared against only once its entry is in the group's
/// section of the document.
#[derive(Debug, Clone)]
pub struct Peer {
    pub share: Object,
    pub security: Dependency<Object>,
    pub common: Dependency<Object>,
}

/// Everything `plan` looks at, fetched fresh on every pass.
#[derive(Debug, Clone, Default)]
pub struct Observed {
    pub share: Option<Object>,
    pub document: Option<Object>,
    pub security: Dependency<Object>,
    pub common: Dependency<Object>,
    pub peers: Vec<Peer>,
    /// Shares in the namespace other than this one that are not being deleted.
    pub other_live_shares: usize,
    pub claim: Option<Object>,
    pub workload: Option<Object>,
    pub service: Option<Object>,
}

/// One store mutation. Objects carry their full desired content; applying
/// an action is a single create, update, or delete.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AddFinalizer(Object),
    AssignGroup(Object),
    CreateDocument(Object),
    PersistDocument(Object),
    CreateClaim(Object),
    CreateWorkload(Object),
    UpdateWorkload(Object),
    CreateService(Object),
    AdoptService(Object),
    SetConvergedStatus(Object),
    RecordEvent {
        involved: Object,
        reason: &'static str,
        message: String,
    },
    DeleteDocument(ObjectKey),
    RemoveFinalizer(Object),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::AddFinalizer(o) => write!(f, "add finalizer to {}", o.key),
            Action::AssignGroup(o) => write!(f, "assign server group to {}", o.key),
            Action::CreateDocument(o) => write!(f, "create {}", o.key),
            Action::PersistDocument(o) => write!(f, "persist {}", o.key),
            Action::CreateClaim(o) | Action::CreateWorkload(o) | Action::CreateService(o) => {
                write!(f, "create {}", o.key)
            }
            Action::UpdateWorkload(o) => write!(f, "update {}", o.key),
            Action::AdoptService(o) => write!(f, "add owner to {}", o.key),
            Action::SetConvergedStatus(o) => write!(f, "mark {} converged", o.key),
            Action::RecordEvent {
                involved, reason, ..
            } => write!(f, "record {reason} event on {}", involved.key),
            Action::DeleteDocument(key) => write!(f, "delete {key}"),
            Action::RemoveFinalizer(o) => write!(f, "remove finalizer from {}", o.key),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub state: ShareState,
    pub action: Option<Action>,
    pub outcome: Outcome,
}

impl Decision {
    fn requeue(state: ShareState, action: Action) -> Self {
        Self {
            state,
            action: Some(action),
            outcome: Outcome::Requeue,
        }
    }

    fn done(state: ShareState, action: Option<Action>) -> Self {
        Self {
            state,
            action,
            outcome: Outcome::Done,
        }
    }

    /// Stop on a configuration problem the user has to fix; retrying cannot
    /// help until the inputs change.
    fn invalid(share: &Object, message: String) -> Self {
        Self::done(
            ShareState::Initializing,
            Some(Action::RecordEvent {
                involved: share.clone(),
                reason: REASON_INVALID_CONFIGURATION,
                message,
            }),
        )
    }
}

/// Decide the single next step for the observed share.
pub fn plan(config: &OperatorConfig, observed: &Observed) -> Result<Decision, CoreError> {
    let Some(share) = observed.share.as_ref() else {
        return Ok(Decision::done(ShareState::Absent, None));
    };
    if share.is_deleting() {
        if !share.has_finalizer(FINALIZER) {
            // Other finalizers hold it; nothing of ours left to undo.
            return Ok(Decision::done(ShareState::Terminating, None));
        }
        return plan_finalize(config, observed, share);
    }
    plan_update(config, observed, share)
}

fn owner_of(share: &Object) -> Result<OwnerReference, CoreError> {
    share.owner_ref().ok_or_else(|| {
        CoreError::Store(StoreError::Decode {
            key: share.key.to_string(),
            reason: "object has no uid".to_owned(),
        })
    })
}

fn peer_instance<'a>(
    config: &'a OperatorConfig,
    peer: &Peer,
    group: &GroupKey,
) -> Option<InstanceConfiguration<'a>> {
    let security =
        resolve_spec::<SmbSecurityConfigSpec>(&peer.security, ObjectKind::SmbSecurityConfig, true)
            .ok()?;
    let common =
        resolve_spec::<SmbCommonConfigSpec>(&peer.common, ObjectKind::SmbCommonConfig, true)
            .ok()?;
    InstanceConfiguration::new(config, &peer.share, group.clone(), security, common).ok()
}

fn is_member(peer: &Peer, members: &[ShareKey]) -> bool {
    peer.share
        .spec_as::<SmbShareSpec>()
        .is_ok_and(|spec| members.contains(&share_key_for(&peer.share.key.name, &spec)))
}

fn plan_update(
    config: &OperatorConfig,
    observed: &Observed,
    share: &Object,
) -> Result<Decision, CoreError> {
    let namespace = share.key.namespace.as_str();
    let spec: SmbShareSpec = share.spec_as()?;
    let status: ShareStatus = share.status_as()?;
    let working = ShareState::Initializing;

    if !share.has_finalizer(FINALIZER) {
        let mut next = share.clone();
        next.add_finalizer(FINALIZER);
        return Ok(Decision::requeue(working, Action::AddFinalizer(next)));
    }

    if spec.is_clustered() && !config.clustering_supported {
        return Ok(Decision::invalid(
            share,
            "clustered availability requested but clustering is disabled".to_owned(),
        ));
    }

    let group = match status.server_group.clone() {
        Some(group) => group,
        None => match resolve_group_key(namespace, &share.key.name, &spec) {
            Err(reason) => return Ok(Decision::invalid(share, reason)),
            Ok(group) => {
                validate_transition(status.state.unwrap_or(ShareState::Absent), working)?;
                let mut next = share.clone();
                next.set_status(&ShareStatus {
                    server_group: Some(group),
                    state: Some(working),
                })?;
                return Ok(Decision::requeue(working, Action::AssignGroup(next)));
            }
        },
    };

    let Some(document) = observed.document.as_ref() else {
        let empty = document_object(namespace, config, &ConfigDocument::new())?;
        return Ok(Decision::requeue(working, Action::CreateDocument(empty)));
    };

    let security = resolve_spec(&observed.security, ObjectKind::SmbSecurityConfig, false)?;
    let common = resolve_spec(&observed.common, ObjectKind::SmbCommonConfig, false)?;
    let instance = InstanceConfiguration::new(config, share, group.clone(), security, common)?;
    let mut doc = read_document(document)?;

    // Peers count once their entry is in the group's section.
    let members = doc
        .configs
        .get(&group)
        .map(|section| section.shares.as_slice())
        .unwrap_or_default();
    for peer in observed.peers.iter().filter(|p| is_member(p, members)) {
        let existing = peer_instance(config, peer, &group);
        if let Err(why) = check_compatible(Some(&instance), existing.as_ref()) {
            return Ok(Decision::invalid(
                share,
                format!(
                    "cannot join server group '{group}' with share '{}': {why}",
                    peer.share.key.name
                ),
            ));
        }
    }

    let changed = match planner::update(&instance, &mut doc) {
        Ok(changed) => changed,
        Err(e @ PlanError::ShareKeyConflict { .. }) => {
            return Ok(Decision::invalid(share, e.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    if changed {
        let mut next = document.clone();
        next.set_spec(&document_data(namespace, &doc)?)?;
        return Ok(Decision::requeue(working, Action::PersistDocument(next)));
    }

    let owner = owner_of(share)?;
    if observed.claim.is_none() {
        if let Some(claim) = claim_object(&instance, owner.clone())? {
            return Ok(Decision::requeue(working, Action::CreateClaim(claim)));
        }
    }

    match observed.workload.as_ref() {
        None => {
            let workload = workload_object(&instance, owner.clone())?;
            return Ok(Decision::requeue(working, Action::CreateWorkload(workload)));
        }
        Some(workload) if !workload.is_owned_by(&owner.uid) => {
            let mut next = workload.clone();
            next.add_owner(owner.clone());
            return Ok(Decision::requeue(working, Action::UpdateWorkload(next)));
        }
        Some(workload) => {
            let desired = desired_replicas(&instance);
            let current = workload.spec.get("replicas").and_then(serde_json::Value::as_u64);
            if current != Some(u64::from(desired)) {
                let mut next = workload.clone();
                let Some(body) = next.spec.as_object_mut() else {
                    return Err(CoreError::Store(StoreError::Decode {
                        key: workload.key.to_string(),
                        reason: "workload spec is not an object".to_owned(),
                    }));
                };
                body.insert("replicas".to_owned(), serde_json::Value::from(desired));
                return Ok(Decision::requeue(working, Action::UpdateWorkload(next)));
            }
        }
    }

    match observed.service.as_ref() {
        None => {
            let service = service_object(&instance, owner)?;
            return Ok(Decision::requeue(working, Action::CreateService(service)));
        }
        Some(service) if !service.is_owned_by(&owner.uid) => {
            let mut next = service.clone();
            next.add_owner(owner);
            return Ok(Decision::requeue(working, Action::AdoptService(next)));
        }
        Some(_) => {}
    }

    if status.state == Some(ShareState::Converged) {
        return Ok(Decision::done(ShareState::Converged, None));
    }
    validate_transition(status.state.unwrap_or(working), ShareState::Converged)?;
    let mut next = share.clone();
    next.set_status(&ShareStatus {
        server_group: Some(group),
        state: Some(ShareState::Converged),
    })?;
    Ok(Decision::done(
        ShareState::Converged,
        Some(Action::SetConvergedStatus(next)),
    ))
}

fn plan_finalize(
    config: &OperatorConfig,
    observed: &Observed,
    share: &Object,
) -> Result<Decision, CoreError> {
    let status: ShareStatus = share.status_as()?;
    validate_transition(
        status.state.unwrap_or(ShareState::Absent),
        ShareState::Terminating,
    )?;
    let state = ShareState::Terminating;

    if let Some(document) = observed.document.as_ref() {
        let mut doc = read_document(document)?;
        if let Some(group) = status.server_group {
            // The security config may be deleted before its shares.
            let security = resolve_spec(&observed.security, ObjectKind::SmbSecurityConfig, true)?;
            let common = resolve_spec(&observed.common, ObjectKind::SmbCommonConfig, true)?;
            let instance = InstanceConfiguration::new(config, share, group, security, common)?;
            if planner::prune(&instance, &mut doc)? {
                let mut next = document.clone();
                next.set_spec(&document_data(&share.key.namespace, &doc)?)?;
                return Ok(Decision::requeue(state, Action::PersistDocument(next)));
            }
        }
        if doc.configs.is_empty() && observed.other_live_shares == 0 {
            return Ok(Decision::requeue(
                state,
                Action::DeleteDocument(document.key.clone()),
            ));
        }
    }

    let mut next = share.clone();
    next.remove_finalizer(FINALIZER);
    Ok(Decision::done(state, Some(Action::RemoveFinalizer(next))))
}

/// Result of driving one share until it settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub passes: u32,
    pub retries: u32,
    pub outcome: Outcome,
}

pub struct Reconciler<'a> {
    store: &'a dyn ObjectStore,
    config: &'a OperatorConfig,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a dyn ObjectStore, config: &'a OperatorConfig) -> Self {
        Self { store, config }
    }

    /// Fetch the snapshot `plan` needs for the share at `key`.
    pub fn observe(&self, key: &ObjectKey) -> Result<Observed, CoreError> {
        let store = self.store;
        let Some(share) = store.get_opt(key)? else {
            return Ok(Observed::default());
        };
        let spec: SmbShareSpec = share.spec_as()?;
        let status: ShareStatus = share.status_as()?;
        let ns = key.namespace.as_str();

        let document = store.get_opt(&document_key(ns, self.config))?;
        let security = resolve_dependency(
            store,
            ObjectKind::SmbSecurityConfig,
            ns,
            spec.security_config.as_deref(),
        )?;
        let common = resolve_dependency(
            store,
            ObjectKind::SmbCommonConfig,
            ns,
            spec.common_config.as_deref(),
        )?;

        let others: Vec<Object> = store
            .list(ObjectKind::SmbShare, Some(ns))?
            .into_iter()
            .filter(|o| o.key != share.key && !o.is_deleting())
            .collect();
        let other_live_shares = others.len();

        let mut peers = Vec::new();
        if let Some(group) = status.server_group.as_ref() {
            for other in others {
                let in_group = other
                    .status_as::<ShareStatus>()
                    .ok()
                    .and_then(|s| s.server_group)
                    .is_some_and(|g| &g == group);
                if !in_group {
                    continue;
                }
                let (security, common) = match other.spec_as::<SmbShareSpec>() {
                    Ok(peer_spec) => (
                        resolve_dependency(
                            store,
                            ObjectKind::SmbSecurityConfig,
                            ns,
                            peer_spec.security_config.as_deref(),
                        )?,
                        resolve_dependency(
                            store,
                            ObjectKind::SmbCommonConfig,
                            ns,
                            peer_spec.common_config.as_deref(),
                        )?,
                    ),
                    // Compatibility reports the unreadable peer.
                    Err(_) => (Dependency::Unnamed, Dependency::Unnamed),
                };
                peers.push(Peer {
                    share: other,
                    security,
                    common,
                });
            }
        }

        let claim = if spec.storage.pvc.name.is_none() {
            store.get_opt(&ObjectKey::new(
                ObjectKind::PersistentVolumeClaim,
                ns,
                claim_name_for(&key.name, &spec),
            ))?
        } else {
            None
        };

        let (workload, service) = match status.server_group.as_ref() {
            Some(group) => (
                store.get_opt(&ObjectKey::new(
                    workload_kind_for(&spec),
                    ns,
                    group.as_str(),
                ))?,
                store.get_opt(&ObjectKey::new(ObjectKind::Service, ns, group.as_str()))?,
            ),
            None => (None, None),
        };

        Ok(Observed {
            share: Some(share),
            document,
            security,
            common,
            peers,
            other_live_shares,
            claim,
            workload,
            service,
        })
    }

    /// Run one convergence step for the share at `key`.
    pub fn process(&self, key: &ObjectKey) -> Result<Outcome, CoreError> {
        let observed = self.observe(key)?;
        let decision = plan(self.config, &observed)?;
        match decision.action {
            Some(action) => {
                info!("{key}: {action}");
                self.apply(action)?;
            }
            None => debug!("{key}: nothing to do ({})", decision.state),
        }
        Ok(decision.outcome)
    }

    /// Apply one planned mutation.
    pub fn apply(&self, action: Action) -> Result<(), CoreError> {
        match action {
            Action::AddFinalizer(obj)
            | Action::AssignGroup(obj)
            | Action::PersistDocument(obj)
            | Action::UpdateWorkload(obj)
            | Action::AdoptService(obj)
            | Action::SetConvergedStatus(obj)
            | Action::RemoveFinalizer(obj) => {
                self.store.update(obj)?;
            }
            Action::CreateDocument(obj)
            | Action::CreateClaim(obj)
            | Action::CreateWorkload(obj)
            | Action::CreateService(obj) => match self.store.create(obj) {
                // Another worker created it first; the next pass picks it up.
                Ok(_) | Err(StoreError::AlreadyExists(_)) => {}
                Err(e) => return Err(e.into()),
            },
            Action::DeleteDocument(key) => match self.store.delete(&key) {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            },
            Action::RecordEvent {
                involved,
                reason,
                message,
            } => {
                record_event(self.store, &involved, reason, &message)?;
            }
        }
        Ok(())
    }

    /// Call `process` until it reports `Done`, at most `max_passes` times.
    ///
    /// Transient store errors (conflicts, unavailability) are retried after
    /// a short backoff, up to [`MAX_TRANSIENT_RETRIES`] in a row. Checks
    /// `should_stop` between passes.
    pub fn run_until_done(
        &self,
        key: &ObjectKey,
        max_passes: u32,
        should_stop: impl Fn() -> bool,
    ) -> Result<RunReport, CoreError> {
        let mut report = RunReport {
            passes: 0,
            retries: 0,
            outcome: Outcome::Requeue,
        };
        let mut consecutive = 0u32;

        while report.passes < max_passes && !should_stop() {
            report.passes += 1;
            match self.process(key) {
                Ok(outcome) => {
                    consecutive = 0;
                    report.outcome = outcome;
                    if outcome == Outcome::Done {
                        break;
                    }
                }
                Err(e) if e.is_transient() && consecutive < MAX_TRANSIENT_RETRIES => {
                    consecutive += 1;
                    report.retries += 1;
                    let backoff = RETRY_BACKOFF_BASE * 2u32.pow(consecutive - 1);
                    warn!("{key}: {e}; retrying in {backoff:?}");
                    std::thread::sleep(backoff);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use smbop_schema::Uid;

    fn share(spec: serde_json::Value) -> Object {
        let mut obj =
            Object::new(ObjectKey::new(ObjectKind::SmbShare, "ns", "s1"), &spec).unwrap();
        obj.metadata.uid = Some(Uid::new("u1"));
        obj.metadata.resource_version = 1;
        obj
    }

    fn observed(share: Object) -> Observed {
        Observed {
            share: Some(share),
            ..Observed::default()
        }
    }

    #[test]
    fn absent_share_is_done() {
        let config = OperatorConfig::default();
        let decision = plan(&config, &Observed::default()).unwrap();
        assert_eq!(decision.state, ShareState::Absent);
        assert!(decision.action.is_none());
        assert_eq!(decision.outcome, Outcome::Done);
    }

    #[test]
    fn finalizer_comes_first() {
        let config = OperatorConfig::default();
        let decision = plan(
            &config,
            &observed(share(json!({"storage": {"pvc": {"name": "d"}}}))),
        )
        .unwrap();
        let Some(Action::AddFinalizer(next)) = decision.action else {
            panic!("expected AddFinalizer, got {:?}", decision.action);
        };
        assert!(next.has_finalizer(FINALIZER));
        assert_eq!(decision.outcome, Outcome::Requeue);
    }

    #[test]
    fn group_assignment_sets_status() {
        let config = OperatorConfig::default();
        let mut obj = share(json!({"storage": {"pvc": {"name": "d"}}}));
        obj.add_finalizer(FINALIZER);
        let decision = plan(&config, &observed(obj)).unwrap();
        let Some(Action::AssignGroup(next)) = decision.action else {
            panic!("expected AssignGroup, got {:?}", decision.action);
        };
        let status: ShareStatus = next.status_as().unwrap();
        assert_eq!(status.server_group.unwrap(), "s1");
        assert_eq!(status.state, Some(ShareState::Initializing));
    }

    #[test]
    fn explicit_group_without_name_records_event() {
        let config = OperatorConfig::default();
        let mut obj = share(json!({
            "storage": {"pvc": {"name": "d"}},
            "scaling": {"group_mode": "explicit"}
        }));
        obj.add_finalizer(FINALIZER);
        let decision = plan(&config, &observed(obj)).unwrap();
        assert!(matches!(
            decision.action,
            Some(Action::RecordEvent {
                reason: REASON_INVALID_CONFIGURATION,
                ..
            })
        ));
        assert_eq!(decision.outcome, Outcome::Done);
    }

    #[test]
    fn clustering_requires_operator_support() {
        let config = OperatorConfig::default();
        let mut obj = share(json!({
            "storage": {"pvc": {"name": "d"}},
            "scaling": {"availability_mode": "clustered"}
        }));
        obj.add_finalizer(FINALIZER);
        let decision = plan(&config, &observed(obj)).unwrap();
        let Some(Action::RecordEvent { message, .. }) = decision.action else {
            panic!("expected RecordEvent, got {:?}", decision.action);
        };
        assert!(message.contains("clustering"));
    }

    #[test]
    fn named_but_missing_security_is_an_error() {
        let config = OperatorConfig::default();
        let mut obj = share(json!({"storage": {"pvc": {"name": "d"}}, "security_config": "sec"}));
        obj.add_finalizer(FINALIZER);
        obj.set_status(&json!({"server_group": "s1", "state": "initializing"}))
            .unwrap();
        let mut obs = observed(obj);
        obs.document = Some(document_object("ns", &config, &ConfigDocument::new()).unwrap());
        obs.security = Dependency::Missing("sec".to_owned());

        let err = plan(&config, &obs).unwrap_err();
        assert!(matches!(
            err,
            CoreError::MissingDependency {
                kind: ObjectKind::SmbSecurityConfig,
                ..
            }
        ));
    }

    #[test]
    fn deleting_share_without_our_finalizer_is_left_alone() {
        let config = OperatorConfig::default();
        let mut obj = share(json!({"storage": {"pvc": {"name": "d"}}}));
        obj.metadata.deletion_timestamp = Some("now".to_owned());
        obj.add_finalizer("someone-else");
        let decision = plan(&config, &observed(obj)).unwrap();
        assert_eq!(decision.state, ShareState::Terminating);
        assert!(decision.action.is_none());
    }

    #[test]
    fn finalize_without_document_removes_finalizer() {
        let config = OperatorConfig::default();
        let mut obj = share(json!({"storage": {"pvc": {"name": "d"}}}));
        obj.add_finalizer(FINALIZER);
        obj.metadata.deletion_timestamp = Some("now".to_owned());
        let decision = plan(&config, &observed(obj)).unwrap();
        let Some(Action::RemoveFinalizer(next)) = decision.action else {
            panic!("expected RemoveFinalizer, got {:?}", decision.action);
        };
        assert!(!next.has_finalizer(FINALIZER));
        assert_eq!(decision.outcome, Outcome::Done);
    }

    #[test]
    fn action_display_names_the_target() {
        let obj = share(json!({}));
        assert_eq!(
            Action::AddFinalizer(obj.clone()).to_string(),
            "add finalizer to SmbShare ns/s1"
        );
        assert_eq!(
            Action::DeleteDocument(obj.key).to_string(),
            "delete SmbShare ns/s1"
        );
    }
}
