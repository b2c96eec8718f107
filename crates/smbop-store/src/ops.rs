//! Store semantics shared by every backend. Backends only provide raw
//! read/write/remove of whole objects under their own exclusion; the rules
//! for uids, versions, finalizers and cascading removal live here once.

use crate::gc::collect_dependents;
use crate::object::{Object, ObjectKey};
use crate::StoreError;
use smbop_schema::Uid;
use tracing::debug;

pub(crate) trait RawObjects {
    fn read(&self, key: &ObjectKey) -> Result<Option<Object>, StoreError>;
    fn write(&mut self, obj: &Object) -> Result<(), StoreError>;
    fn remove(&mut self, key: &ObjectKey) -> Result<(), StoreError>;
    fn in_namespace(&self, namespace: &str) -> Result<Vec<Object>, StoreError>;
}

pub(crate) fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Mint a uid from the key, the wall clock, and a caller-supplied salt that
/// differs between calls within one process.
pub(crate) fn mint_uid(key: &ObjectKey, salt: u64) -> Uid {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default();
    let input = format!(
        "{}/{}/{}/{nanos}/{salt}/{}",
        key.kind,
        key.namespace,
        key.name,
        std::process::id()
    );
    Uid::new(blake3::hash(input.as_bytes()).to_hex()[..32].to_owned())
}

pub(crate) fn create(
    raw: &mut impl RawObjects,
    mut obj: Object,
    uid: Uid,
) -> Result<Object, StoreError> {
    if raw.read(&obj.key)?.is_some() {
        return Err(StoreError::AlreadyExists(obj.key.to_string()));
    }
    obj.metadata.uid = Some(uid);
    obj.metadata.resource_version = 1;
    obj.metadata.generation = 1;
    obj.metadata.deletion_timestamp = None;
    obj.metadata.created_at = Some(now());
    raw.write(&obj)?;
    debug!("created {}", obj.key);
    Ok(obj)
}

pub(crate) fn update(raw: &mut impl RawObjects, mut obj: Object) -> Result<Object, StoreError> {
    let Some(current) = raw.read(&obj.key)? else {
        return Err(StoreError::NotFound(obj.key.to_string()));
    };
    let uid_matches = obj.metadata.uid.is_none() || obj.metadata.uid == current.metadata.uid;
    if !uid_matches || obj.metadata.resource_version != current.metadata.resource_version {
        return Err(StoreError::Conflict {
            key: obj.key.to_string(),
            expected: obj.metadata.resource_version,
            actual: current.metadata.resource_version,
        });
    }

    // Store-owned fields cannot be changed through an update.
    obj.metadata.uid.clone_from(&current.metadata.uid);
    obj.metadata.created_at.clone_from(&current.metadata.created_at);
    obj.metadata
        .deletion_timestamp
        .clone_from(&current.metadata.deletion_timestamp);
    obj.metadata.generation = if obj.spec == current.spec {
        current.metadata.generation
    } else {
        current.metadata.generation + 1
    };
    obj.metadata.resource_version = current.metadata.resource_version + 1;

    if obj.is_deleting() && obj.metadata.finalizers.is_empty() {
        remove_and_collect(raw, &obj)?;
        return Ok(obj);
    }
    raw.write(&obj)?;
    debug!(
        "updated {} (rv={}, gen={})",
        obj.key, obj.metadata.resource_version, obj.metadata.generation
    );
    Ok(obj)
}

pub(crate) fn delete(raw: &mut impl RawObjects, key: &ObjectKey) -> Result<(), StoreError> {
    let Some(mut current) = raw.read(key)? else {
        return Err(StoreError::NotFound(key.to_string()));
    };
    if current.metadata.finalizers.is_empty() {
        return remove_and_collect(raw, &current);
    }
    if current.metadata.deletion_timestamp.is_none() {
        current.metadata.deletion_timestamp = Some(now());
        current.metadata.resource_version += 1;
        raw.write(&current)?;
        debug!(
            "marked {} for deletion, waiting on finalizers {:?}",
            key, current.metadata.finalizers
        );
    }
    Ok(())
}

fn remove_and_collect(raw: &mut impl RawObjects, obj: &Object) -> Result<(), StoreError> {
    raw.remove(&obj.key)?;
    debug!("removed {}", obj.key);
    if let Some(uid) = obj.uid() {
        let report = collect_dependents(raw, &obj.key.namespace, uid)?;
        if !report.removed.is_empty() {
            debug!(
                "{} dependents of {} collected, {} detached, {} pending",
                report.removed.len(),
                obj.key,
                report.detached.len(),
                report.pending.len()
            );
        }
    }
    Ok(())
}
