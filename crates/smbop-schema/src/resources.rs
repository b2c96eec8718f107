//! Declarative resource specs submitted by users: shares, security configs,
//! common configs, and the secret/config-map payloads they reference.

use crate::types::GroupKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn default_true() -> bool {
    true
}

fn default_min_cluster_size() -> u32 {
    2
}

fn default_access_modes() -> Vec<String> {
    vec!["ReadWriteOnce".to_owned()]
}

/// A user's request for one exported directory.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SmbShareSpec {
    /// Display name of the share. Falls back to the resource name.
    #[serde(default)]
    pub share_name: Option<String>,
    pub storage: StorageSpec,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_true")]
    pub browseable: bool,
    #[serde(default)]
    pub security_config: Option<String>,
    #[serde(default)]
    pub common_config: Option<String>,
    #[serde(default)]
    pub scaling: Option<ScalingSpec>,
}

impl SmbShareSpec {
    /// Grouping policy, defaulting to `never` when no scaling block is given.
    pub fn group_mode(&self) -> GroupMode {
        self.scaling
            .as_ref()
            .map_or(GroupMode::Never, |s| s.group_mode)
    }

    pub fn is_clustered(&self) -> bool {
        self.scaling
            .as_ref()
            .is_some_and(|s| s.availability_mode == AvailabilityMode::Clustered)
    }

    pub fn min_cluster_size(&self) -> u32 {
        self.scaling
            .as_ref()
            .map_or(default_min_cluster_size(), |s| s.min_cluster_size)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StorageSpec {
    pub pvc: PvcSpec,
}

/// Either the name of a pre-existing claim or an embedded claim template.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PvcSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub spec: Option<ClaimTemplate>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClaimTemplate {
    #[serde(default)]
    pub storage_class: Option<String>,
    #[serde(default = "default_access_modes")]
    pub access_modes: Vec<String>,
    pub size: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum GroupMode {
    #[default]
    Never,
    Explicit,
    ImplicitByStorage,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AvailabilityMode {
    #[default]
    Standard,
    Clustered,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScalingSpec {
    #[serde(default)]
    pub group_mode: GroupMode,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub availability_mode: AvailabilityMode,
    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: u32,
}

/// Convergence state of a share as observed by the reconciler.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ShareState {
    Absent,
    Initializing,
    Converged,
    Terminating,
}

impl std::fmt::Display for ShareState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShareState::Absent => write!(f, "absent"),
            ShareState::Initializing => write!(f, "initializing"),
            ShareState::Converged => write!(f, "converged"),
            ShareState::Terminating => write!(f, "terminating"),
        }
    }
}

/// Status written back onto a share by the reconciler.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ShareStatus {
    /// Server group this share belongs to. Immutable once assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_group: Option<GroupKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ShareState>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SecurityMode {
    User,
    ActiveDirectory,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SmbSecurityConfigSpec {
    pub mode: SecurityMode,
    /// Secret and key holding user/group JSON (user mode).
    #[serde(default)]
    pub users: Option<SecretKeyRef>,
    /// Kerberos realm (active-directory mode).
    #[serde(default)]
    pub realm: Option<String>,
    /// Ordered ID-map domains. Empty means one catch-all range.
    #[serde(default)]
    pub domains: Vec<IdmapDomain>,
    #[serde(default)]
    pub join_sources: Vec<JoinSource>,
    #[serde(default)]
    pub dns_registration: DnsRegistration,
}

impl SmbSecurityConfigSpec {
    /// Upper-cased realm, empty when unset.
    pub fn realm_upper(&self) -> String {
        self.realm
            .as_deref()
            .map(|r| r.trim().to_uppercase())
            .unwrap_or_default()
    }

    /// Workgroup derived from the first label of the realm.
    pub fn workgroup(&self) -> String {
        let realm = self.realm_upper();
        realm.split('.').next().unwrap_or_default().to_owned()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SecretKeyRef {
    pub secret: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JoinSource {
    pub user_join: SecretKeyRef,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IdmapDomain {
    pub name: String,
    #[serde(default)]
    pub backend: Option<IdmapBackend>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IdmapBackend {
    Autorid,
    Ad,
}

impl IdmapBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            IdmapBackend::Autorid => "autorid",
            IdmapBackend::Ad => "ad",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DnsRegistration {
    #[default]
    Never,
    ExternalAddress,
    ClusterAddress,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SmbCommonConfigSpec {
    #[serde(default)]
    pub network: NetworkSpec,
    #[serde(default)]
    pub pod_settings: PodSettings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NetworkSpec {
    #[serde(default)]
    pub publish: PublishMode,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PublishMode {
    #[default]
    Cluster,
    External,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PodSettings {
    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub affinity: Vec<NodeAffinityTerm>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NodeAffinityTerm {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Key/value payload of a `Secret` or `ConfigMap` object.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct DataSpec {
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}
