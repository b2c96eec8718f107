use crate::file::read_object_file;
use crate::layout::StoreLayout;
use crate::object::{Object, ObjectKey};
use crate::StoreError;
use smbop_schema::{ObjectKind, Uid};
use std::collections::HashSet;

#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub checked: usize,
    pub passed: usize,
    pub failed: Vec<IntegrityFailure>,
    /// Objects still referencing an owner that no longer exists, typically
    /// left by a crash in the middle of a cascading delete.
    pub dangling_owners: Vec<IntegrityFailure>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.dangling_owners.is_empty()
    }
}

#[derive(Debug)]
pub struct IntegrityFailure {
    pub subject: String,
    pub reason: String,
}

/// Check every object file under `layout`: checksum, JSON shape, that the
/// stored key matches the file location, and that owner references resolve.
pub fn verify_store_integrity(layout: &StoreLayout) -> Result<IntegrityReport, StoreError> {
    layout.verify_version()?;
    let mut report = IntegrityReport::default();

    for namespace in layout.namespaces()? {
        let mut intact: Vec<Object> = Vec::new();
        for kind in ObjectKind::ALL {
            for path in layout.object_files(&namespace, kind)? {
                report.checked += 1;
                let subject = path.display().to_string();
                let expected_key = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(|name| ObjectKey::new(kind, namespace.clone(), name));

                match read_object_file(&path) {
                    Ok(obj) if Some(&obj.key) != expected_key.as_ref() => {
                        report.failed.push(IntegrityFailure {
                            subject,
                            reason: format!("stored key '{}' does not match location", obj.key),
                        });
                    }
                    Ok(obj) => {
                        report.passed += 1;
                        intact.push(obj);
                    }
                    Err(StoreError::IntegrityFailure { actual, .. }) => {
                        report.failed.push(IntegrityFailure {
                            subject,
                            reason: format!("checksum mismatch: got {actual}"),
                        });
                    }
                    Err(e) => {
                        report.failed.push(IntegrityFailure {
                            subject,
                            reason: format!("read error: {e}"),
                        });
                    }
                }
            }
        }

        let live: HashSet<&Uid> = intact.iter().filter_map(Object::uid).collect();
        for obj in &intact {
            for owner in &obj.metadata.owner_references {
                if !live.contains(&owner.uid) {
                    report.dangling_owners.push(IntegrityFailure {
                        subject: obj.key.to_string(),
                        reason: format!("owner {} '{}' no longer exists", owner.kind, owner.name),
                    });
                }
            }
        }
    }

    Ok(report)
}
