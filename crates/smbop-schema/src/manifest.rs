use crate::resources::{
    ClaimTemplate, DataSpec, SmbCommonConfigSpec, SmbSecurityConfigSpec, SmbShareSpec,
};
use crate::types::ObjectKind;
use crate::validate::{validate_name, validate_security, validate_share};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("failed to parse manifest: {0}")]
    ParseJson(#[from] serde_json::Error),
    #[error("invalid resource name: {0}")]
    InvalidName(String),
    #[error("namespace must not be empty")]
    EmptyNamespace,
    #[error("{kind} objects are managed by the reconciler and cannot be applied")]
    ManagedKind { kind: ObjectKind },
    #[error("invalid {kind} spec: {reason}")]
    InvalidSpec { kind: ObjectKind, reason: String },
}

impl SchemaError {
    pub(crate) fn invalid(kind: ObjectKind, reason: impl Into<String>) -> Self {
        SchemaError::InvalidSpec {
            kind,
            reason: reason.into(),
        }
    }
}

/// One user-submitted resource: kind, location, and an untyped spec that is
/// checked against the typed schema for its kind by [`ResourceManifest::validate`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ResourceManifest {
    pub kind: ObjectKind,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub spec: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestFile {
    Bundle { resource: Vec<ResourceManifest> },
    List(Vec<ResourceManifest>),
    Single(ResourceManifest),
}

impl ResourceManifest {
    /// Check the location and that the spec deserializes into, and passes
    /// validation for, the typed schema of its kind.
    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.namespace.trim().is_empty() {
            return Err(SchemaError::EmptyNamespace);
        }
        validate_name(&self.name)?;
        let spec = self.spec.clone();
        match self.kind {
            ObjectKind::SmbShare => {
                let s: SmbShareSpec = from_spec(self.kind, spec)?;
                validate_share(&s)
            }
            ObjectKind::SmbSecurityConfig => {
                let s: SmbSecurityConfigSpec = from_spec(self.kind, spec)?;
                validate_security(&s)
            }
            ObjectKind::SmbCommonConfig => {
                from_spec::<SmbCommonConfigSpec>(self.kind, spec).map(|_| ())
            }
            ObjectKind::Secret | ObjectKind::ConfigMap => {
                from_spec::<DataSpec>(self.kind, spec).map(|_| ())
            }
            ObjectKind::PersistentVolumeClaim => {
                from_spec::<ClaimTemplate>(self.kind, spec).map(|_| ())
            }
            kind @ (ObjectKind::Deployment
            | ObjectKind::StatefulSet
            | ObjectKind::Service
            | ObjectKind::Event) => Err(SchemaError::ManagedKind { kind }),
        }
    }
}

fn from_spec<T: serde::de::DeserializeOwned>(
    kind: ObjectKind,
    spec: serde_json::Value,
) -> Result<T, SchemaError> {
    // An absent spec deserializes as an empty table.
    let spec = if spec.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        spec
    };
    serde_json::from_value(spec).map_err(|e| SchemaError::invalid(kind, e.to_string()))
}

/// Parse one or more resources from TOML or JSON text.
///
/// TOML input is either a single resource table or a `[[resource]]` bundle.
/// JSON input is either a single object or an array of objects.
pub fn parse_manifest_str(input: &str) -> Result<Vec<ResourceManifest>, SchemaError> {
    let trimmed = input.trim_start();
    let file: ManifestFile = if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(input)?
    } else {
        toml::from_str(input)?
    };
    Ok(match file {
        ManifestFile::Bundle { resource } | ManifestFile::List(resource) => resource,
        ManifestFile::Single(r) => vec![r],
    })
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<Vec<ResourceManifest>, SchemaError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_toml_share() {
        let input = r#"
kind = "SmbShare"
namespace = "default"
name = "share1"

[spec]
read_only = true

[spec.storage.pvc]
name = "data"
"#;
        let all = parse_manifest_str(input).expect("should parse");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].kind, ObjectKind::SmbShare);
        assert_eq!(all[0].spec["read_only"], serde_json::json!(true));
        all[0].validate().unwrap();
    }

    #[test]
    fn parses_toml_bundle() {
        let input = r#"
[[resource]]
kind = "SmbCommonConfig"
namespace = "ns"
name = "pub"
[resource.spec.network]
publish = "external"

[[resource]]
kind = "Secret"
namespace = "ns"
name = "users"
[resource.spec.data]
"users.json" = "{}"
"#;
        let all = parse_manifest_str(input).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].kind, ObjectKind::Secret);
        for r in &all {
            r.validate().unwrap();
        }
    }

    #[test]
    fn parses_json_list() {
        let input = r#"[
            {"kind": "SmbShare", "namespace": "ns", "name": "a",
             "spec": {"storage": {"pvc": {"name": "d"}}}},
            {"kind": "SmbShare", "namespace": "ns", "name": "b",
             "spec": {"storage": {"pvc": {"name": "d"}}}}
        ]"#;
        let all = parse_manifest_str(input).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].name, "b");
    }

    #[test]
    fn rejects_managed_kinds() {
        let r = ResourceManifest {
            kind: ObjectKind::Deployment,
            namespace: "ns".to_owned(),
            name: "x".to_owned(),
            spec: serde_json::Value::Null,
        };
        assert!(matches!(r.validate(), Err(SchemaError::ManagedKind { .. })));
    }

    #[test]
    fn rejects_malformed_spec() {
        let r = ResourceManifest {
            kind: ObjectKind::SmbShare,
            namespace: "ns".to_owned(),
            name: "x".to_owned(),
            spec: serde_json::json!({"storage": 7}),
        };
        let err = r.validate().unwrap_err();
        assert!(err.to_string().contains("invalid SmbShare spec"));
    }

    #[test]
    fn rejects_empty_namespace() {
        let r = ResourceManifest {
            kind: ObjectKind::SmbCommonConfig,
            namespace: " ".to_owned(),
            name: "x".to_owned(),
            spec: serde_json::Value::Null,
        };
        assert!(matches!(r.validate(), Err(SchemaError::EmptyNamespace)));
    }
}
