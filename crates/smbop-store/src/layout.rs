use crate::object::ObjectKey;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use smbop_schema::ObjectKind;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Current on-disk format version. Incremented on incompatible layout changes.
pub const STORE_FORMAT_VERSION: u32 = 1;
const VERSION_FILE: &str = "version";
pub(crate) const OBJECT_EXT: &str = "json";

/// Directory layout of a file-backed object store.
///
/// Objects live at `store/objects/<namespace>/<Kind>/<name>.json` under the
/// root, next to a format version marker and the lock file guarding writers.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreVersion {
    format_version: u32,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[inline]
    fn store_dir(&self) -> PathBuf {
        self.root.join("store")
    }

    #[inline]
    pub fn objects_dir(&self) -> PathBuf {
        self.store_dir().join("objects")
    }

    #[inline]
    pub fn namespace_dir(&self, namespace: &str) -> PathBuf {
        self.objects_dir().join(namespace)
    }

    #[inline]
    pub fn kind_dir(&self, namespace: &str, kind: ObjectKind) -> PathBuf {
        self.namespace_dir(namespace).join(kind.as_str())
    }

    #[inline]
    pub fn object_path(&self, key: &ObjectKey) -> PathBuf {
        self.kind_dir(&key.namespace, key.kind)
            .join(format!("{}.{OBJECT_EXT}", key.name))
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.store_dir().join(".lock")
    }

    pub fn is_initialized(&self) -> bool {
        self.store_dir().join(VERSION_FILE).is_file()
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(self.objects_dir())?;

        let store_dir = self.store_dir();
        let version_path = store_dir.join(VERSION_FILE);
        if version_path.exists() {
            self.verify_version()?;
        } else {
            let ver = StoreVersion {
                format_version: STORE_FORMAT_VERSION,
            };
            let content = serde_json::to_string_pretty(&ver)?;
            let mut tmp = NamedTempFile::new_in(&store_dir)?;
            tmp.write_all(content.as_bytes())?;
            tmp.as_file().sync_all()?;
            tmp.persist(&version_path)
                .map_err(|e| StoreError::Io(e.error))?;
            crate::fsync_dir(&store_dir)?;
        }

        Ok(())
    }

    pub fn verify_version(&self) -> Result<(), StoreError> {
        let content = fs::read_to_string(self.store_dir().join(VERSION_FILE))?;
        let ver: StoreVersion = serde_json::from_str(&content)?;

        if ver.format_version != STORE_FORMAT_VERSION {
            return Err(StoreError::VersionMismatch {
                expected: STORE_FORMAT_VERSION,
                found: ver.format_version,
            });
        }
        Ok(())
    }

    /// Namespaces that have an object directory, sorted.
    pub fn namespaces(&self) -> Result<Vec<String>, StoreError> {
        list_dir_names(&self.objects_dir(), |p| p.is_dir())
    }

    /// Paths of every object file of `kind` in `namespace`, sorted by name.
    pub fn object_files(
        &self,
        namespace: &str,
        kind: ObjectKind,
    ) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.kind_dir(namespace, kind);
        let names = list_dir_names(&dir, |p| {
            p.is_file() && p.extension().is_some_and(|e| e == OBJECT_EXT)
        })?;
        Ok(names.into_iter().map(|n| dir.join(n)).collect())
    }
}

/// Sorted names of the visible entries of `dir` accepted by `keep`.
/// A missing directory has no entries.
fn list_dir_names(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<String>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        // Dotfiles are temp files from interrupted atomic writes.
        if name.starts_with('.') || !keep(&path) {
            continue;
        }
        names.push(name.to_owned());
    }
    names.sort();
    Ok(names)
}
