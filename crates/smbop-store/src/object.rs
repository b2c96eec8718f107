use crate::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use smbop_schema::{ObjectKind, Uid};
use std::collections::BTreeMap;
use std::fmt;

/// Location of an object: kind plus namespace/name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub kind: ObjectKind,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: ObjectKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse `<namespace>/<name>` into a key of the given kind.
    pub fn parse(kind: ObjectKind, input: &str) -> Option<Self> {
        let (ns, name) = input.split_once('/')?;
        if ns.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self::new(kind, ns, name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub kind: ObjectKind,
    pub name: String,
    pub uid: Uid,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Assigned by the store on creation; empty on objects not yet created.
    #[serde(default)]
    pub uid: Option<Uid>,
    /// Optimistic-concurrency token. Updates must present the current value.
    #[serde(default)]
    pub resource_version: u64,
    /// Bumped by the store whenever `spec` changes.
    #[serde(default)]
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// A stored object: location, store-managed metadata, and untyped
/// spec/status bodies that callers decode into their own types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Object {
    pub key: ObjectKey,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub status: serde_json::Value,
}

impl Object {
    pub fn new(key: ObjectKey, spec: &impl Serialize) -> Result<Self, StoreError> {
        Ok(Self {
            key,
            metadata: ObjectMeta::default(),
            spec: serde_json::to_value(spec)?,
            status: serde_json::Value::Null,
        })
    }

    pub fn with_owner(mut self, owner: OwnerReference) -> Self {
        self.add_owner(owner);
        self
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.metadata
            .labels
            .insert(key.to_owned(), value.to_owned());
        self
    }

    pub fn uid(&self) -> Option<&Uid> {
        self.metadata.uid.as_ref()
    }

    pub fn spec_as<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(self.spec.clone()).map_err(|e| StoreError::Decode {
            key: self.key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Decode the status body; a missing status decodes as the default.
    pub fn status_as<T: DeserializeOwned + Default>(&self) -> Result<T, StoreError> {
        if self.status.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(self.status.clone()).map_err(|e| StoreError::Decode {
            key: self.key.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn set_spec(&mut self, spec: &impl Serialize) -> Result<(), StoreError> {
        self.spec = serde_json::to_value(spec)?;
        Ok(())
    }

    pub fn set_status(&mut self, status: &impl Serialize) -> Result<(), StoreError> {
        self.status = serde_json::to_value(status)?;
        Ok(())
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, name: &str) -> bool {
        self.metadata.finalizers.iter().any(|f| f == name)
    }

    /// Returns true if the finalizer was added.
    pub fn add_finalizer(&mut self, name: &str) -> bool {
        if self.has_finalizer(name) {
            return false;
        }
        self.metadata.finalizers.push(name.to_owned());
        true
    }

    /// Returns true if the finalizer was present.
    pub fn remove_finalizer(&mut self, name: &str) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != name);
        before != self.metadata.finalizers.len()
    }

    pub fn is_owned_by(&self, uid: &Uid) -> bool {
        self.metadata
            .owner_references
            .iter()
            .any(|o| &o.uid == uid)
    }

    /// Returns true if the owner was added.
    pub fn add_owner(&mut self, owner: OwnerReference) -> bool {
        if self.is_owned_by(&owner.uid) {
            return false;
        }
        self.metadata.owner_references.push(owner);
        true
    }

    /// Reference to this object for use as an owner of dependents.
    /// `None` until the store has assigned a uid.
    pub fn owner_ref(&self) -> Option<OwnerReference> {
        Some(OwnerReference {
            kind: self.key.kind,
            name: self.key.name.clone(),
            uid: self.metadata.uid.clone()?,
        })
    }
}
