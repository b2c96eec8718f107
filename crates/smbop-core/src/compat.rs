use crate::instance::{InstanceConfiguration, Resolved};
use crate::planner::share_options;
use smbop_schema::{AvailabilityMode, ShareKey, Uid};
use thiserror::Error;

/// Why two shares cannot be served by the same server group.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Incompatibility {
    #[error("one of the shares could not be read")]
    MissingShare,
    #[error("shares live in different namespaces ('{current}' vs '{existing}')")]
    NamespaceMismatch { current: String, existing: String },
    #[error("shares use different storage claims ('{current}' vs '{existing}')")]
    StorageClaimMismatch { current: String, existing: String },
    #[error("shares reference different security configs ({current:?} vs {existing:?})")]
    SecurityConfigMismatch {
        current: Option<String>,
        existing: Option<String>,
    },
    #[error("shares reference different common configs ({current:?} vs {existing:?})")]
    CommonConfigMismatch {
        current: Option<String>,
        existing: Option<String>,
    },
    #[error("security config '{name}' was replaced since the group was formed")]
    SecurityConfigUidMismatch { name: String },
    #[error("common config '{name}' was replaced since the group was formed")]
    CommonConfigUidMismatch { name: String },
    #[error("shares disagree on availability mode ({current:?} vs {existing:?})")]
    AvailabilityMismatch {
        current: AvailabilityMode,
        existing: AvailabilityMode,
    },
    #[error("shares disagree on minimum cluster size ({current} vs {existing})")]
    ClusterSizeMismatch { current: u32, existing: u32 },
    #[error("share entry '{share}' is already defined with different options")]
    ShareEntryMismatch { share: ShareKey },
}

/// Decide whether `current` may join the group `existing` already belongs to.
///
/// Checks run in a fixed order and stop at the first mismatch. Either side
/// may be absent when its share could not be decoded.
pub fn check_compatible(
    current: Option<&InstanceConfiguration<'_>>,
    existing: Option<&InstanceConfiguration<'_>>,
) -> Result<(), Incompatibility> {
    let (Some(current), Some(existing)) = (current, existing) else {
        return Err(Incompatibility::MissingShare);
    };

    if current.namespace != existing.namespace {
        return Err(Incompatibility::NamespaceMismatch {
            current: current.namespace.clone(),
            existing: existing.namespace.clone(),
        });
    }

    let (a, b) = (current.claim_name(), existing.claim_name());
    if a != b {
        return Err(Incompatibility::StorageClaimMismatch {
            current: a,
            existing: b,
        });
    }

    if current.security_ref() != existing.security_ref() {
        return Err(Incompatibility::SecurityConfigMismatch {
            current: current.security_ref().map(str::to_owned),
            existing: existing.security_ref().map(str::to_owned),
        });
    }

    if current.common_ref() != existing.common_ref() {
        return Err(Incompatibility::CommonConfigMismatch {
            current: current.common_ref().map(str::to_owned),
            existing: existing.common_ref().map(str::to_owned),
        });
    }

    if let Some(name) = uid_mismatch(current.security.as_ref(), existing.security.as_ref()) {
        return Err(Incompatibility::SecurityConfigUidMismatch { name });
    }
    if let Some(name) = uid_mismatch(current.common.as_ref(), existing.common.as_ref()) {
        return Err(Incompatibility::CommonConfigUidMismatch { name });
    }

    let (a, b) = (availability(current), availability(existing));
    if a != b {
        return Err(Incompatibility::AvailabilityMismatch {
            current: a,
            existing: b,
        });
    }
    if a == AvailabilityMode::Clustered {
        let (a, b) = (
            current.share.min_cluster_size(),
            existing.share.min_cluster_size(),
        );
        if a != b {
            return Err(Incompatibility::ClusterSizeMismatch {
                current: a,
                existing: b,
            });
        }
    }

    // One document entry per display name; two members may only share it
    // when they would write the same options.
    let key = current.share_key();
    if key == existing.share_key() && share_options(current) != share_options(existing) {
        return Err(Incompatibility::ShareEntryMismatch { share: key });
    }

    Ok(())
}

fn availability(instance: &InstanceConfiguration<'_>) -> AvailabilityMode {
    if instance.is_clustered() {
        AvailabilityMode::Clustered
    } else {
        AvailabilityMode::Standard
    }
}

/// Only compared when both sides resolved the reference to an object.
fn uid_mismatch<T>(a: Option<&Resolved<T>>, b: Option<&Resolved<T>>) -> Option<String> {
    let (a, b) = (a?, b?);
    let (ua, ub): (&Uid, &Uid) = (a.uid.as_ref()?, b.uid.as_ref()?);
    (ua != ub).then(|| a.name.clone())
}
