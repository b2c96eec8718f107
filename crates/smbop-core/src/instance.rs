//! The per-pass bundle of everything one share needs: its own spec, the
//! security and common configs it references, and the operator config.
//! Rebuilt on every pass and never persisted.

use crate::CoreError;
use serde::de::DeserializeOwned;
use smbop_schema::{
    DnsRegistration, GlobalKey, GroupKey, ObjectKind, OperatorConfig, PublishMode, SecurityMode,
    ShareKey, SmbCommonConfigSpec, SmbSecurityConfigSpec, SmbShareSpec, Uid,
};
use smbop_store::{Object, ObjectKey, ObjectStore, StoreError};

/// Outcome of looking up an optional reference by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency<T> {
    /// The referencing resource names nothing.
    Unnamed,
    /// A name is given but no such object exists.
    Missing(String),
    Found(T),
}

impl<T> Default for Dependency<T> {
    fn default() -> Self {
        Dependency::Unnamed
    }
}

impl<T> Dependency<T> {
    pub fn found(&self) -> Option<&T> {
        match self {
            Dependency::Found(t) => Some(t),
            _ => None,
        }
    }
}

/// Fetch the object `name` refers to, if it names one.
pub fn resolve_dependency(
    store: &dyn ObjectStore,
    kind: ObjectKind,
    namespace: &str,
    name: Option<&str>,
) -> Result<Dependency<Object>, StoreError> {
    let Some(name) = name else {
        return Ok(Dependency::Unnamed);
    };
    match store.get_opt(&ObjectKey::new(kind, namespace, name))? {
        Some(obj) => Ok(Dependency::Found(obj)),
        None => Ok(Dependency::Missing(name.to_owned())),
    }
}

/// A referenced config decoded from its store object, with the identity it
/// was resolved against.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub name: String,
    pub uid: Option<Uid>,
    pub spec: T,
}

impl<T: DeserializeOwned> Resolved<T> {
    pub fn from_object(obj: &Object) -> Result<Self, CoreError> {
        Ok(Self {
            name: obj.key.name.clone(),
            uid: obj.uid().cloned(),
            spec: obj.spec_as()?,
        })
    }
}

/// Decode a dependency. `Missing` is an error unless `tolerate_missing`.
pub fn resolve_spec<T: DeserializeOwned>(
    dep: &Dependency<Object>,
    kind: ObjectKind,
    tolerate_missing: bool,
) -> Result<Option<Resolved<T>>, CoreError> {
    match dep {
        Dependency::Unnamed => Ok(None),
        Dependency::Missing(_) if tolerate_missing => Ok(None),
        Dependency::Missing(name) => Err(CoreError::MissingDependency {
            kind,
            name: name.clone(),
        }),
        Dependency::Found(obj) => Resolved::from_object(obj).map(Some),
    }
}

/// Claim backing a share: the named claim, or `<share>-pvc` for a claim
/// built from an embedded template.
pub fn claim_name_for(resource_name: &str, share: &SmbShareSpec) -> String {
    match share.storage.pvc.name.as_deref() {
        Some(name) => name.to_owned(),
        None => format!("{resource_name}-pvc"),
    }
}

/// Document entry key for a share: the trimmed display name, or the
/// resource name when none is set.
pub fn share_key_for(resource_name: &str, share: &SmbShareSpec) -> ShareKey {
    match share.share_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => ShareKey::new(name),
        _ => ShareKey::new(resource_name),
    }
}

#[derive(Debug, Clone)]
pub struct InstanceConfiguration<'a> {
    pub namespace: String,
    /// Resource name of the share.
    pub name: String,
    pub share_uid: Option<Uid>,
    pub share: SmbShareSpec,
    pub group: GroupKey,
    pub security: Option<Resolved<SmbSecurityConfigSpec>>,
    pub common: Option<Resolved<SmbCommonConfigSpec>>,
    pub config: &'a OperatorConfig,
}

impl<'a> InstanceConfiguration<'a> {
    pub fn new(
        config: &'a OperatorConfig,
        share: &Object,
        group: GroupKey,
        security: Option<Resolved<SmbSecurityConfigSpec>>,
        common: Option<Resolved<SmbCommonConfigSpec>>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            namespace: share.key.namespace.clone(),
            name: share.key.name.clone(),
            share_uid: share.uid().cloned(),
            share: share.spec_as()?,
            group,
            security,
            common,
            config,
        })
    }

    pub fn share_key(&self) -> ShareKey {
        share_key_for(&self.name, &self.share)
    }

    /// Name of the storage claim backing the share.
    pub fn claim_name(&self) -> String {
        claim_name_for(&self.name, &self.share)
    }

    /// True when the claim is created from an embedded template.
    pub fn claim_is_templated(&self) -> bool {
        self.share.storage.pvc.name.is_none() && self.share.storage.pvc.spec.is_some()
    }

    pub fn security_spec(&self) -> Option<&SmbSecurityConfigSpec> {
        self.security.as_ref().map(|r| &r.spec)
    }

    pub fn common_spec(&self) -> Option<&SmbCommonConfigSpec> {
        self.common.as_ref().map(|r| &r.spec)
    }

    pub fn is_domain_joined(&self) -> bool {
        self.security_spec()
            .is_some_and(|s| s.mode == SecurityMode::ActiveDirectory)
    }

    /// Global option set key for the realm this share joins, if any.
    pub fn realm_key(&self) -> Option<GlobalKey> {
        let security = self.security_spec()?;
        if security.mode != SecurityMode::ActiveDirectory {
            return None;
        }
        let realm = security.realm_upper();
        (!realm.is_empty()).then(|| GlobalKey::new(realm))
    }

    pub fn is_clustered(&self) -> bool {
        self.share.is_clustered()
    }

    pub fn dns_registration(&self) -> DnsRegistration {
        match self.security_spec() {
            Some(s) if s.mode == SecurityMode::ActiveDirectory => s.dns_registration,
            _ => DnsRegistration::Never,
        }
    }

    pub fn publish_mode(&self) -> PublishMode {
        self.common_spec()
            .map_or(PublishMode::Cluster, |c| c.network.publish)
    }

    /// Names of the referenced configs, resolved or not.
    pub fn security_ref(&self) -> Option<&str> {
        self.share.security_config.as_deref()
    }

    pub fn common_ref(&self) -> Option<&str> {
        self.share.common_config.as_deref()
    }
}
