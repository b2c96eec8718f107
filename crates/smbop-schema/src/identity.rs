use crate::resources::{GroupMode, SmbShareSpec};
use crate::types::GroupKey;
use crate::validate::validate_grouping;

/// Longest claim prefix kept in an implicit group key, leaving room for the
/// `-<hash>` suffix inside a 63-character DNS label.
const CLAIM_PREFIX_MAX: usize = 54;

/// Group key for shares grouped implicitly by a shared storage claim.
///
/// The claim name keeps the key readable; the blake3 suffix over
/// `namespace/claim` keeps it collision-free against share names used by
/// `never`-grouped shares and stable across passes.
pub fn implicit_group_key(namespace: &str, claim: &str) -> GroupKey {
    let digest = blake3::hash(format!("{namespace}/{claim}").as_bytes())
        .to_hex()
        .to_string();
    let mut prefix: String = claim
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .take(CLAIM_PREFIX_MAX)
        .collect();
    while prefix.ends_with('-') {
        prefix.pop();
    }
    let prefix = prefix.trim_start_matches('-');
    if prefix.is_empty() {
        GroupKey::new(format!("grp-{}", &digest[..8]))
    } else {
        GroupKey::new(format!("{prefix}-{}", &digest[..8]))
    }
}

/// Derive the server group a share belongs to from its grouping policy.
///
/// Deterministic: the same resource always maps to the same key. The caller
/// stores the result on the share and never recomputes it once assigned.
/// Returns a human-readable reason for invalid policy combinations.
pub fn resolve_group_key(
    namespace: &str,
    resource_name: &str,
    spec: &SmbShareSpec,
) -> Result<GroupKey, String> {
    validate_grouping(spec)?;
    match spec.group_mode() {
        GroupMode::Never => Ok(GroupKey::new(resource_name)),
        GroupMode::Explicit => spec
            .scaling
            .as_ref()
            .and_then(|s| s.group.as_deref())
            .map(|g| GroupKey::new(g.trim()))
            .ok_or_else(|| "explicit group_mode requires a group name".to_owned()),
        GroupMode::ImplicitByStorage => match spec.storage.pvc.name.as_deref() {
            Some(claim) => Ok(implicit_group_key(namespace, claim)),
            // A templated claim is private to its share, so the group is too.
            None => Ok(GroupKey::new(resource_name)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(json: serde_json::Value) -> SmbShareSpec {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn never_uses_resource_name() {
        let s = share(serde_json::json!({"storage": {"pvc": {"name": "d"}}}));
        assert_eq!(resolve_group_key("ns", "share1", &s).unwrap(), "share1");
    }

    #[test]
    fn explicit_uses_group_name() {
        let s = share(serde_json::json!({
            "storage": {"pvc": {"name": "d"}},
            "scaling": {"group_mode": "explicit", "group": "team"}
        }));
        assert_eq!(resolve_group_key("ns", "share1", &s).unwrap(), "team");
    }

    #[test]
    fn explicit_without_name_is_invalid() {
        let s = share(serde_json::json!({
            "storage": {"pvc": {"name": "d"}},
            "scaling": {"group_mode": "explicit"}
        }));
        assert!(resolve_group_key("ns", "share1", &s).is_err());
    }

    #[test]
    fn implicit_groups_by_claim() {
        let a = share(serde_json::json!({
            "storage": {"pvc": {"name": "data"}},
            "scaling": {"group_mode": "implicit-by-storage"}
        }));
        let ka = resolve_group_key("ns", "a", &a).unwrap();
        let kb = resolve_group_key("ns", "b", &a).unwrap();
        assert_eq!(ka, kb);
        assert!(ka.starts_with("data-"));
        assert_ne!(ka, resolve_group_key("other", "a", &a).unwrap());
    }

    #[test]
    fn implicit_with_template_falls_back_to_name() {
        let s = share(serde_json::json!({
            "storage": {"pvc": {"spec": {"size": "1Gi"}}},
            "scaling": {"group_mode": "implicit-by-storage"}
        }));
        assert_eq!(resolve_group_key("ns", "solo", &s).unwrap(), "solo");
    }

    #[test]
    fn implicit_key_is_dns_safe_and_bounded() {
        let key = implicit_group_key("ns", &format!("Weird_Name.{}", "x".repeat(80)));
        assert!(key.len() <= 63);
        assert!(key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-'));
        assert_eq!(implicit_group_key("ns", "__").len(), "grp-".len() + 8);
    }
}
