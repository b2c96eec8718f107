use crate::object::ObjectKey;
use crate::ops::{now, RawObjects};
use crate::StoreError;
use smbop_schema::Uid;
use tracing::debug;

/// What one cascade pass did after an owner disappeared.
#[derive(Debug, Default)]
pub struct GcReport {
    /// Dependents removed because their last owner went away.
    pub removed: Vec<ObjectKey>,
    /// Dependents that lost one owner reference but still have others.
    pub detached: Vec<ObjectKey>,
    /// Dependents marked for deletion but held back by finalizers.
    pub pending: Vec<ObjectKey>,
}

/// Drop references to a removed owner from its namespace, removing every
/// dependent left without owners, transitively.
pub(crate) fn collect_dependents(
    raw: &mut impl RawObjects,
    namespace: &str,
    owner: &Uid,
) -> Result<GcReport, StoreError> {
    let mut report = GcReport::default();
    let mut gone = vec![owner.clone()];

    while let Some(uid) = gone.pop() {
        for mut dependent in raw.in_namespace(namespace)? {
            if !dependent.is_owned_by(&uid) {
                continue;
            }
            dependent
                .metadata
                .owner_references
                .retain(|o| o.uid != uid);
            dependent.metadata.resource_version += 1;

            if !dependent.metadata.owner_references.is_empty() {
                raw.write(&dependent)?;
                report.detached.push(dependent.key);
                continue;
            }
            if !dependent.metadata.finalizers.is_empty() {
                if dependent.metadata.deletion_timestamp.is_none() {
                    dependent.metadata.deletion_timestamp = Some(now());
                }
                raw.write(&dependent)?;
                report.pending.push(dependent.key);
                continue;
            }
            raw.remove(&dependent.key)?;
            debug!("collected orphaned {}", dependent.key);
            if let Some(child) = dependent.metadata.uid.take() {
                gone.push(child);
            }
            report.removed.push(dependent.key);
        }
    }

    Ok(report)
}
