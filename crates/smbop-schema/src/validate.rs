//! Structural validation of resource specs beyond what serde enforces.

use crate::manifest::SchemaError;
use crate::resources::{GroupMode, SecurityMode, SmbSecurityConfigSpec, SmbShareSpec};
use crate::types::ObjectKind;

/// Resource names follow DNS label rules: 1-63 characters of `[a-z0-9-]`,
/// starting and ending with an alphanumeric.
pub fn validate_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() || name.len() > 63 {
        return Err(SchemaError::InvalidName(format!(
            "'{name}': name must be 1-63 characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(SchemaError::InvalidName(format!(
            "'{name}': name must match [a-z0-9-]"
        )));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(SchemaError::InvalidName(format!(
            "'{name}': name must start and end with an alphanumeric character"
        )));
    }
    Ok(())
}

pub fn validate_share(spec: &SmbShareSpec) -> Result<(), SchemaError> {
    let kind = ObjectKind::SmbShare;
    match (&spec.storage.pvc.name, &spec.storage.pvc.spec) {
        (Some(_), Some(_)) => {
            return Err(SchemaError::invalid(
                kind,
                "storage.pvc.name and storage.pvc.spec are mutually exclusive",
            ))
        }
        (None, None) => {
            return Err(SchemaError::invalid(
                kind,
                "one of storage.pvc.name or storage.pvc.spec is required",
            ))
        }
        (Some(name), None) if name.trim().is_empty() => {
            return Err(SchemaError::invalid(kind, "storage.pvc.name is empty"))
        }
        _ => {}
    }
    if let Some(ref name) = spec.share_name {
        if name.trim().is_empty() {
            return Err(SchemaError::invalid(kind, "share_name is empty"));
        }
    }
    validate_grouping(spec).map_err(|reason| SchemaError::invalid(kind, reason))
}

/// Check the grouping and scaling combination. Returns a human-readable
/// reason; the reconciler surfaces the same text in its events.
pub fn validate_grouping(spec: &SmbShareSpec) -> Result<(), String> {
    let Some(ref scaling) = spec.scaling else {
        return Ok(());
    };
    let group = scaling.group.as_deref().map(str::trim).unwrap_or_default();
    match scaling.group_mode {
        GroupMode::Explicit if group.is_empty() => {
            return Err("explicit group_mode requires a group name".to_owned());
        }
        GroupMode::Explicit => {
            validate_name(group).map_err(|e| e.to_string())?;
        }
        GroupMode::Never | GroupMode::ImplicitByStorage if !group.is_empty() => {
            return Err(format!(
                "group name '{group}' is only valid with explicit group_mode"
            ));
        }
        GroupMode::Never | GroupMode::ImplicitByStorage => {}
    }
    if spec.is_clustered() && scaling.min_cluster_size == 0 {
        return Err("min_cluster_size must be at least 1".to_owned());
    }
    Ok(())
}

pub fn validate_security(spec: &SmbSecurityConfigSpec) -> Result<(), SchemaError> {
    let kind = ObjectKind::SmbSecurityConfig;
    match spec.mode {
        SecurityMode::User => {
            if spec.users.is_none() {
                return Err(SchemaError::invalid(kind, "user mode requires users secret"));
            }
        }
        SecurityMode::ActiveDirectory => {
            let realm = spec.realm_upper();
            if realm.is_empty() {
                return Err(SchemaError::invalid(
                    kind,
                    "active-directory mode requires a realm",
                ));
            }
            if realm.split('.').any(str::is_empty) {
                return Err(SchemaError::invalid(
                    kind,
                    format!("realm '{realm}' has an empty label"),
                ));
            }
            let mut seen = std::collections::BTreeSet::new();
            for d in &spec.domains {
                let name = d.name.trim();
                if name.is_empty() {
                    return Err(SchemaError::invalid(kind, "idmap domain name is empty"));
                }
                if !seen.insert(name.to_uppercase()) {
                    return Err(SchemaError::invalid(
                        kind,
                        format!("idmap domain '{name}' declared twice"),
                    ));
                }
            }
        }
    }
    Ok(())
}
