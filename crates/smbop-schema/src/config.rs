//! Operator-wide defaults, loaded once and threaded through every call as an
//! immutable value.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read operator config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse operator config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid operator config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct OperatorConfig {
    pub smbd_container_image: String,
    pub svc_watch_container_image: String,
    pub smbd_container_name: String,
    pub winbind_container_name: String,
    pub workload_image_pull_policy: String,
    pub service_account_name: String,
    /// Name of the per-namespace config object holding the document.
    pub document_name: String,
    /// Allow shares to request clustered (multi-replica) server groups.
    pub clustering_supported: bool,
    pub smb_port: u16,
    pub permissions_method: String,
    pub permissions_status_xattr: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            smbd_container_image: "quay.io/samba.org/samba-server:latest".to_owned(),
            svc_watch_container_image: "quay.io/samba.org/svcwatch:latest".to_owned(),
            smbd_container_name: "samba".to_owned(),
            winbind_container_name: "wb".to_owned(),
            workload_image_pull_policy: "IfNotPresent".to_owned(),
            service_account_name: "samba".to_owned(),
            document_name: "samba-container-config".to_owned(),
            clustering_supported: false,
            smb_port: 445,
            permissions_method: "initialize-share-mode".to_owned(),
            permissions_status_xattr: "user.share-perms-status".to_owned(),
        }
    }
}

impl OperatorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        parse_config_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.smb_port == 0 {
            return Err(ConfigError::Invalid("smb_port must be non-zero".to_owned()));
        }
        for (field, value) in [
            ("smbd_container_image", &self.smbd_container_image),
            ("smbd_container_name", &self.smbd_container_name),
            ("document_name", &self.document_name),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

pub fn parse_config_str(input: &str) -> Result<OperatorConfig, ConfigError> {
    let config: OperatorConfig = toml::from_str(input)?;
    config.validate()?;
    Ok(config)
}
