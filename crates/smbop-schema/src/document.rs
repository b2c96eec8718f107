//! The shared configuration document consumed by the in-container startup
//! tooling. One document exists per namespace; every server group reads its
//! own section from it.
//!
//! All maps are ordered so that serializing the same logical document always
//! yields the same bytes. The reconciler relies on that to detect no-op passes.

use crate::types::{GlobalKey, GroupKey, ShareKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Version tag written into the `samba-container-config` field.
pub const DOCUMENT_VERSION: &str = "v0";
/// Key of the default global option set shared by every section.
pub const DEFAULT_GLOBALS: &str = "globals";
/// Key of the user/group entry list.
pub const ALL_ENTRIES: &str = "all_entries";
/// Data key under which the document is stored in its config object.
pub const DOCUMENT_DATA_KEY: &str = "config.json";

pub const YES: &str = "yes";
pub const NO: &str = "no";

pub const PATH_PARAM: &str = "path";
pub const READ_ONLY_PARAM: &str = "read only";
pub const BROWSEABLE_PARAM: &str = "browseable";

/// Render a boolean the way the downstream tooling requires.
pub fn yes_no(value: bool) -> &'static str {
    if value {
        YES
    } else {
        NO
    }
}

pub type SmbOptions = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("malformed configuration document: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unsupported configuration document version '{0}', expected 'v0'")]
    UnsupportedVersion(String),
    #[error("config section '{section}' references missing {target} '{key}'")]
    DanglingReference {
        section: String,
        target: &'static str,
        key: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionSet {
    #[serde(default)]
    pub options: SmbOptions,
}

impl OptionSet {
    pub fn new(options: SmbOptions) -> Self {
        Self { options }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FeatureFlag {
    /// Clustered server group coordinated through CTDB.
    Ctdb,
}

/// How the startup tooling prepares share directory permissions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionsConfig {
    pub method: String,
    pub status_xattr: String,
}

/// Per-group section: which shares and global sets one server process loads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSection {
    #[serde(default)]
    pub shares: Vec<ShareKey>,
    #[serde(default)]
    pub globals: Vec<GlobalKey>,
    #[serde(default)]
    pub instance_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instance_features: Vec<FeatureFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<PermissionsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigDocument {
    #[serde(rename = "samba-container-config")]
    pub version: String,
    #[serde(default)]
    pub configs: BTreeMap<GroupKey, ConfigSection>,
    #[serde(default)]
    pub shares: BTreeMap<ShareKey, OptionSet>,
    #[serde(default)]
    pub globals: BTreeMap<GlobalKey, OptionSet>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub users: BTreeMap<String, Vec<UserEntry>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Vec<GroupEntry>>,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigDocument {
    /// An empty document, as created on first use in a namespace.
    pub fn new() -> Self {
        Self {
            version: DOCUMENT_VERSION.to_owned(),
            configs: BTreeMap::new(),
            shares: BTreeMap::new(),
            globals: BTreeMap::new(),
            users: BTreeMap::new(),
            groups: BTreeMap::new(),
        }
    }

    /// Parse a persisted document. A parse failure is reported, never
    /// papered over with an empty document.
    pub fn from_json(input: &str) -> Result<Self, DocumentError> {
        let doc: ConfigDocument = serde_json::from_str(input)?;
        if doc.version != DOCUMENT_VERSION {
            return Err(DocumentError::UnsupportedVersion(doc.version));
        }
        Ok(doc)
    }

    /// Canonical serialization. Equal documents produce identical bytes.
    pub fn to_json(&self) -> Result<String, DocumentError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
            && self.shares.is_empty()
            && self.globals.is_empty()
            && self.users.is_empty()
            && self.groups.is_empty()
    }

    /// True if any section other than `except` lists `key`.
    pub fn share_referenced(&self, key: &ShareKey, except: Option<&GroupKey>) -> bool {
        self.configs
            .iter()
            .filter(|(g, _)| Some(*g) != except)
            .any(|(_, s)| s.shares.contains(key))
    }

    pub fn global_referenced(&self, key: &GlobalKey) -> bool {
        self.configs.values().any(|s| s.globals.contains(key))
    }

    /// Check that every key a section references resolves.
    pub fn validate(&self) -> Result<(), DocumentError> {
        for (group, section) in &self.configs {
            for key in &section.shares {
                if !self.shares.contains_key(key) {
                    return Err(DocumentError::DanglingReference {
                        section: group.to_string(),
                        target: "share",
                        key: key.to_string(),
                    });
                }
            }
            for key in &section.globals {
                if !self.globals.contains_key(key) {
                    return Err(DocumentError::DanglingReference {
                        section: group.to_string(),
                        target: "global",
                        key: key.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
