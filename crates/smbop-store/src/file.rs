use crate::backend::ObjectStore;
use crate::layout::StoreLayout;
use crate::lock::StoreLock;
use crate::object::{Object, ObjectKey};
use crate::ops::{self, RawObjects};
use crate::{fsync_dir, StoreError};
use serde::{Deserialize, Serialize};
use smbop_schema::ObjectKind;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::NamedTempFile;
use tracing::warn;

/// On-disk form of one object: the object plus a blake3 checksum over its
/// pretty-printed JSON.
#[derive(Debug, Serialize, Deserialize)]
struct StoredObject {
    checksum: String,
    object: Object,
}

fn compute_checksum(obj: &Object) -> Result<String, StoreError> {
    let json = serde_json::to_string_pretty(obj)?;
    Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
}

/// Read and verify one object file.
pub(crate) fn read_object_file(path: &Path) -> Result<Object, StoreError> {
    let content = fs::read_to_string(path)?;
    let stored: StoredObject = serde_json::from_str(&content)?;
    let actual = compute_checksum(&stored.object)?;
    if actual != stored.checksum {
        return Err(StoreError::IntegrityFailure {
            subject: path.display().to_string(),
            expected: stored.checksum,
            actual,
        });
    }
    Ok(stored.object)
}

/// Object store persisted as one checksummed JSON file per object.
///
/// Every mutation runs under the store's exclusive file lock and lands via
/// write-to-temp, fsync, rename, fsync-dir, so a crash leaves each object
/// either at its old or its new version. Reads take no lock.
pub struct FileStore {
    layout: StoreLayout,
    uid_salt: AtomicU64,
}

impl FileStore {
    /// Open the store at `root`, creating its layout on first use.
    pub fn open(root: impl Into<std::path::PathBuf>) -> Result<Self, StoreError> {
        let layout = StoreLayout::new(root);
        layout.initialize()?;
        Ok(Self {
            layout,
            uid_salt: AtomicU64::new(0),
        })
    }

    pub fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    fn with_lock<T>(
        &self,
        f: impl FnOnce(&mut FileObjects<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _lock = StoreLock::acquire(&self.layout.lock_file())?;
        f(&mut FileObjects {
            layout: &self.layout,
        })
    }
}

/// Raw object access for one locked mutation.
struct FileObjects<'a> {
    layout: &'a StoreLayout,
}

impl RawObjects for FileObjects<'_> {
    fn read(&self, key: &ObjectKey) -> Result<Option<Object>, StoreError> {
        let path = self.layout.object_path(key);
        if !path.exists() {
            return Ok(None);
        }
        read_object_file(&path).map(Some)
    }

    fn write(&mut self, obj: &Object) -> Result<(), StoreError> {
        let dir = self.layout.kind_dir(&obj.key.namespace, obj.key.kind);
        fs::create_dir_all(&dir)?;

        let stored = StoredObject {
            checksum: compute_checksum(obj)?,
            object: obj.clone(),
        };
        let content = serde_json::to_string_pretty(&stored)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.layout.object_path(&obj.key))
            .map_err(|e| StoreError::Io(e.error))?;
        fsync_dir(&dir)?;
        Ok(())
    }

    fn remove(&mut self, key: &ObjectKey) -> Result<(), StoreError> {
        let path = self.layout.object_path(key);
        if path.exists() {
            fs::remove_file(&path)?;
            fsync_dir(&self.layout.kind_dir(&key.namespace, key.kind))?;
        }
        Ok(())
    }

    fn in_namespace(&self, namespace: &str) -> Result<Vec<Object>, StoreError> {
        let mut out = Vec::new();
        for kind in ObjectKind::ALL {
            out.extend(read_kind(self.layout, namespace, kind)?);
        }
        Ok(out)
    }
}

/// Objects of one kind in one namespace. Unreadable files are skipped with
/// a warning; `verify-store` reports them.
fn read_kind(
    layout: &StoreLayout,
    namespace: &str,
    kind: ObjectKind,
) -> Result<Vec<Object>, StoreError> {
    let mut out = Vec::new();
    for path in layout.object_files(namespace, kind)? {
        match read_object_file(&path) {
            Ok(obj) => out.push(obj),
            Err(e) => warn!("skipping unreadable object '{}': {e}", path.display()),
        }
    }
    Ok(out)
}

impl ObjectStore for FileStore {
    fn get(&self, key: &ObjectKey) -> Result<Object, StoreError> {
        let path = self.layout.object_path(key);
        if !path.exists() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        read_object_file(&path)
    }

    fn create(&self, obj: Object) -> Result<Object, StoreError> {
        let salt = self.uid_salt.fetch_add(1, Ordering::Relaxed);
        let uid = ops::mint_uid(&obj.key, salt);
        self.with_lock(|raw| ops::create(raw, obj, uid))
    }

    fn update(&self, obj: Object) -> Result<Object, StoreError> {
        self.with_lock(|raw| ops::update(raw, obj))
    }

    fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.with_lock(|raw| ops::delete(raw, key))
    }

    fn list(&self, kind: ObjectKind, namespace: Option<&str>) -> Result<Vec<Object>, StoreError> {
        let namespaces = match namespace {
            Some(ns) => vec![ns.to_owned()],
            None => self.layout.namespaces()?,
        };
        let mut out = Vec::new();
        for ns in &namespaces {
            out.extend(read_kind(&self.layout, ns, kind)?);
        }
        Ok(out)
    }
}
