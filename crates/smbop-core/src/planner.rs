//! Additive and subtractive planning of the shared configuration document.
//!
//! `update` merges one share into the document and `prune` takes it back
//! out. Both are pure and report whether they changed anything, so callers
//! write the document only when needed. `prune` undoes exactly what `update`
//! added for the share, leaving other members of a group untouched.

use crate::idmap::idmap_options;
use crate::instance::InstanceConfiguration;
use smbop_schema::document::{
    ALL_ENTRIES, BROWSEABLE_PARAM, DEFAULT_GLOBALS, PATH_PARAM, READ_ONLY_PARAM,
};
use smbop_schema::{
    yes_no, ConfigDocument, ConfigSection, DocumentError, FeatureFlag, GlobalKey, GroupKey,
    OperatorConfig, OptionSet, PermissionsConfig, ShareKey, SmbOptions, SmbSecurityConfigSpec,
    UserEntry,
};
use thiserror::Error;

pub const DEFAULT_SMB_PORT: u16 = 445;
pub const SHARE_MOUNT_ROOT: &str = "/mnt";
pub const DEFAULT_USER: &str = "sambauser";
pub const DEFAULT_PASSWORD: &str = "samba";

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("share '{share}' is domain-joined but its security config has no realm")]
    MissingRealm { share: String },
    #[error("share entry '{share}' already belongs to server group '{group}'")]
    ShareKeyConflict { share: ShareKey, group: GroupKey },
    #[error("planned document is inconsistent: {0}")]
    Inconsistent(#[from] DocumentError),
}

pub fn default_globals(config: &OperatorConfig) -> SmbOptions {
    let mut options = SmbOptions::from([
        ("load printers".to_owned(), "no".to_owned()),
        ("printing".to_owned(), "bsd".to_owned()),
        ("printcap name".to_owned(), "/dev/null".to_owned()),
        ("disable spoolss".to_owned(), "yes".to_owned()),
    ]);
    if config.smb_port != DEFAULT_SMB_PORT {
        options.insert("smb ports".to_owned(), config.smb_port.to_string());
    }
    options
}

pub fn share_options(instance: &InstanceConfiguration<'_>) -> SmbOptions {
    SmbOptions::from([
        (
            PATH_PARAM.to_owned(),
            format!("{SHARE_MOUNT_ROOT}/{}", instance.claim_name()),
        ),
        (
            READ_ONLY_PARAM.to_owned(),
            yes_no(instance.share.read_only).to_owned(),
        ),
        (
            BROWSEABLE_PARAM.to_owned(),
            yes_no(instance.share.browseable).to_owned(),
        ),
    ])
}

pub fn realm_globals(security: &SmbSecurityConfigSpec) -> SmbOptions {
    let mut options = SmbOptions::from([
        ("security".to_owned(), "ads".to_owned()),
        ("workgroup".to_owned(), security.workgroup()),
        ("realm".to_owned(), security.realm_upper()),
    ]);
    options.extend(idmap_options(&security.domains));
    options
}

fn default_users() -> Vec<UserEntry> {
    vec![UserEntry {
        name: DEFAULT_USER.to_owned(),
        password: Some(DEFAULT_PASSWORD.to_owned()),
        uid: None,
        gid: None,
    }]
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, item: T) -> bool {
    if list.contains(&item) {
        return false;
    }
    list.push(item);
    true
}

/// Section other than `group` that already lists `key`.
fn foreign_owner<'d>(
    doc: &'d ConfigDocument,
    key: &ShareKey,
    group: &GroupKey,
) -> Option<&'d GroupKey> {
    doc.configs
        .iter()
        .find(|(g, section)| *g != group && section.shares.contains(key))
        .map(|(g, _)| g)
}

/// Merge one share into `doc`. Returns true iff the document changed.
///
/// Fails without touching `doc` when the share's entry is already listed by
/// another server group.
pub fn update(
    instance: &InstanceConfiguration<'_>,
    doc: &mut ConfigDocument,
) -> Result<bool, PlanError> {
    let share_key = instance.share_key();
    if let Some(group) = foreign_owner(doc, &share_key, &instance.group) {
        return Err(PlanError::ShareKeyConflict {
            share: share_key,
            group: group.clone(),
        });
    }

    let mut changed = false;
    let default_key = GlobalKey::new(DEFAULT_GLOBALS);

    if !doc.globals.contains_key(&default_key) {
        doc.globals.insert(
            default_key.clone(),
            OptionSet::new(default_globals(instance.config)),
        );
        changed = true;
    }

    let entry = doc.shares.entry(share_key.clone()).or_default();
    for (k, v) in share_options(instance) {
        if entry.options.get(&k) != Some(&v) {
            entry.options.insert(k, v);
            changed = true;
        }
    }

    let realm_key = if instance.is_domain_joined() {
        let key = instance.realm_key().ok_or_else(|| PlanError::MissingRealm {
            share: instance.name.clone(),
        })?;
        Some(key)
    } else {
        None
    };

    let section = doc
        .configs
        .entry(instance.group.clone())
        .or_insert_with(|| {
            changed = true;
            ConfigSection {
                shares: Vec::new(),
                globals: vec![default_key.clone()],
                instance_name: instance.group.to_string(),
                instance_features: Vec::new(),
                permissions: Some(PermissionsConfig {
                    method: instance.config.permissions_method.clone(),
                    status_xattr: instance.config.permissions_status_xattr.clone(),
                }),
            }
        });

    let mut stale = Vec::new();
    if instance.share.group_mode() == smbop_schema::GroupMode::Never {
        // The section belongs to this share alone; drop keys left behind by
        // an earlier display name.
        stale = section
            .shares
            .iter()
            .filter(|k| **k != share_key)
            .cloned()
            .collect();
        section.shares.retain(|k| *k == share_key);
        changed |= !stale.is_empty();
    }
    changed |= push_unique(&mut section.shares, share_key);
    changed |= push_unique(&mut section.globals, default_key);
    if let Some(ref key) = realm_key {
        changed |= push_unique(&mut section.globals, key.clone());
    }
    if instance.is_clustered() {
        changed |= push_unique(&mut section.instance_features, FeatureFlag::Ctdb);
    }

    for key in stale {
        if !doc.share_referenced(&key, None) {
            doc.shares.remove(&key);
        }
    }

    if let (Some(key), Some(security)) = (realm_key, instance.security_spec()) {
        if !doc.globals.contains_key(&key) {
            doc.globals
                .insert(key, OptionSet::new(realm_globals(security)));
            changed = true;
        }
    }

    if doc.users.is_empty() && doc.groups.is_empty() {
        doc.users.insert(ALL_ENTRIES.to_owned(), default_users());
        changed = true;
    }

    doc.validate()?;
    Ok(changed)
}

/// Remove one share from `doc`. Returns true iff the document changed.
///
/// Works without the share's security config, which may already be gone
/// when a share is torn down.
pub fn prune(
    instance: &InstanceConfiguration<'_>,
    doc: &mut ConfigDocument,
) -> Result<bool, PlanError> {
    let mut changed = false;
    let share_key = instance.share_key();

    if let Some(section) = doc.configs.get_mut(&instance.group) {
        let before = section.shares.len();
        section.shares.retain(|k| *k != share_key);
        changed |= section.shares.len() != before;
        if section.shares.is_empty() {
            doc.configs.remove(&instance.group);
            changed = true;
        }
    }

    if !doc.share_referenced(&share_key, None) && doc.shares.remove(&share_key).is_some() {
        changed = true;
    }

    let default_key = GlobalKey::new(DEFAULT_GLOBALS);
    let unreferenced: Vec<GlobalKey> = doc
        .globals
        .keys()
        .filter(|k| **k != default_key && !doc.global_referenced(k))
        .cloned()
        .collect();
    for key in unreferenced {
        doc.globals.remove(&key);
        changed = true;
    }

    if doc.configs.is_empty() {
        if doc.globals.remove(&default_key).is_some() {
            changed = true;
        }
        let placeholder_only = doc.groups.is_empty()
            && doc.users.len() == 1
            && doc.users.get(ALL_ENTRIES) == Some(&default_users());
        if placeholder_only {
            doc.users.clear();
            changed = true;
        }
    }

    doc.validate()?;
    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use smbop_schema::{GroupKey, ObjectKind, ShareKey};
    use smbop_store::{Object, ObjectKey};

    fn instance<'a>(
        config: &'a OperatorConfig,
        name: &str,
        group: &str,
        spec: serde_json::Value,
    ) -> InstanceConfiguration<'a> {
        let obj = Object::new(ObjectKey::new(ObjectKind::SmbShare, "ns", name), &spec).unwrap();
        InstanceConfiguration::new(config, &obj, GroupKey::new(group), None, None).unwrap()
    }

    #[test]
    fn default_globals_include_port_only_when_non_standard() {
        let mut config = OperatorConfig::default();
        assert!(!default_globals(&config).contains_key("smb ports"));
        config.smb_port = 4445;
        assert_eq!(default_globals(&config)["smb ports"], "4445");
    }

    #[test]
    fn update_corrects_mismatched_share_options() {
        let config = OperatorConfig::default();
        let inst = instance(&config, "s1", "s1", json!({"storage": {"pvc": {"name": "d"}}}));
        let mut doc = ConfigDocument::new();
        update(&inst, &mut doc).unwrap();

        doc.shares
            .get_mut(&ShareKey::new("s1"))
            .unwrap()
            .options
            .insert(READ_ONLY_PARAM.to_owned(), "yes".to_owned());
        assert!(update(&inst, &mut doc).unwrap());
        assert_eq!(doc.shares[&ShareKey::new("s1")].get(READ_ONLY_PARAM), Some("no"));
        assert!(!update(&inst, &mut doc).unwrap());
    }

    #[test]
    fn renamed_never_grouped_share_replaces_stale_key() {
        let config = OperatorConfig::default();
        let mut doc = ConfigDocument::new();
        let old = instance(&config, "s1", "s1", json!({"storage": {"pvc": {"name": "d"}}}));
        update(&old, &mut doc).unwrap();

        let renamed = instance(
            &config,
            "s1",
            "s1",
            json!({"share_name": "Data", "storage": {"pvc": {"name": "d"}}}),
        );
        assert!(update(&renamed, &mut doc).unwrap());
        let section = &doc.configs[&GroupKey::new("s1")];
        assert_eq!(section.shares, vec![ShareKey::new("Data")]);
        assert!(!doc.shares.contains_key(&ShareKey::new("s1")));
    }

    #[test]
    fn display_name_owned_by_another_group_is_left_alone() {
        let config = OperatorConfig::default();
        let mut doc = ConfigDocument::new();
        let a = instance(
            &config,
            "a",
            "a",
            json!({"share_name": "Data", "storage": {"pvc": {"name": "x"}}}),
        );
        update(&a, &mut doc).unwrap();
        let before = doc.clone();

        let b = instance(
            &config,
            "b",
            "b",
            json!({"share_name": "Data", "storage": {"pvc": {"name": "y"}}}),
        );
        let err = update(&b, &mut doc).unwrap_err();
        assert!(matches!(
            err,
            PlanError::ShareKeyConflict { ref share, ref group }
                if share.as_str() == "Data" && group.as_str() == "a"
        ));
        assert_eq!(doc, before);
        assert_eq!(doc.shares[&ShareKey::new("Data")].get(PATH_PARAM), Some("/mnt/x"));

        // Taking the rejected share back out keeps the owner's entry.
        assert!(!prune(&b, &mut doc).unwrap());
        assert_eq!(doc, before);
    }

    #[test]
    fn clustered_share_sets_ctdb_feature() {
        let config = OperatorConfig::default();
        let inst = instance(
            &config,
            "s1",
            "g",
            json!({
                "storage": {"pvc": {"name": "d"}},
                "scaling": {"group_mode": "explicit", "group": "g", "availability_mode": "clustered"}
            }),
        );
        let mut doc = ConfigDocument::new();
        update(&inst, &mut doc).unwrap();
        assert_eq!(
            doc.configs[&GroupKey::new("g")].instance_features,
            vec![FeatureFlag::Ctdb]
        );
    }

    #[test]
    fn section_carries_permissions_bootstrap() {
        let config = OperatorConfig::default();
        let inst = instance(&config, "s1", "s1", json!({"storage": {"pvc": {"name": "d"}}}));
        let mut doc = ConfigDocument::new();
        update(&inst, &mut doc).unwrap();
        let perms = doc.configs[&GroupKey::new("s1")].permissions.clone().unwrap();
        assert_eq!(perms.method, "initialize-share-mode");
        assert_eq!(perms.status_xattr, "user.share-perms-status");
    }

    #[test]
    fn existing_users_suppress_placeholder() {
        let config = OperatorConfig::default();
        let inst = instance(&config, "s1", "s1", json!({"storage": {"pvc": {"name": "d"}}}));
        let mut doc = ConfigDocument::new();
        doc.users.insert(
            ALL_ENTRIES.to_owned(),
            vec![UserEntry {
                name: "alice".to_owned(),
                password: None,
                uid: Some(1000),
                gid: None,
            }],
        );
        update(&inst, &mut doc).unwrap();
        assert_eq!(doc.users[ALL_ENTRIES][0].name, "alice");

        // Real users survive pruning the last share.
        prune(&inst, &mut doc).unwrap();
        assert_eq!(doc.users[ALL_ENTRIES][0].name, "alice");
    }

    #[test]
    fn prune_of_unknown_share_is_noop() {
        let config = OperatorConfig::default();
        let a = instance(&config, "a", "a", json!({"storage": {"pvc": {"name": "d"}}}));
        let b = instance(&config, "b", "b", json!({"storage": {"pvc": {"name": "d"}}}));
        let mut doc = ConfigDocument::new();
        update(&a, &mut doc).unwrap();
        let before = doc.clone();
        assert!(!prune(&b, &mut doc).unwrap());
        assert_eq!(doc, before);
    }
}
