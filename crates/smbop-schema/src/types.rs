//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings so the persisted
//! configuration document keeps its flat JSON shape.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Key of a share option set in the configuration document.
    ShareKey
);

string_newtype!(
    /// Key of a server group: one config section, one server workload.
    GroupKey
);

string_newtype!(
    /// Key of a global option set (the default set or one per realm).
    GlobalKey
);

string_newtype!(
    /// Stable identifier the object store assigns on creation.
    Uid
);

/// Kinds of objects held by the external object store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    SmbShare,
    SmbSecurityConfig,
    SmbCommonConfig,
    Secret,
    ConfigMap,
    PersistentVolumeClaim,
    Deployment,
    StatefulSet,
    Service,
    Event,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 10] = [
        ObjectKind::SmbShare,
        ObjectKind::SmbSecurityConfig,
        ObjectKind::SmbCommonConfig,
        ObjectKind::Secret,
        ObjectKind::ConfigMap,
        ObjectKind::PersistentVolumeClaim,
        ObjectKind::Deployment,
        ObjectKind::StatefulSet,
        ObjectKind::Service,
        ObjectKind::Event,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::SmbShare => "SmbShare",
            ObjectKind::SmbSecurityConfig => "SmbSecurityConfig",
            ObjectKind::SmbCommonConfig => "SmbCommonConfig",
            ObjectKind::Secret => "Secret",
            ObjectKind::ConfigMap => "ConfigMap",
            ObjectKind::PersistentVolumeClaim => "PersistentVolumeClaim",
            ObjectKind::Deployment => "Deployment",
            ObjectKind::StatefulSet => "StatefulSet",
            ObjectKind::Service => "Service",
            ObjectKind::Event => "Event",
        }
    }

    /// Parse a kind name, case-insensitively. Accepts the short aliases
    /// `share`, `pvc`, `svc` and friends used on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        let lower = s.to_ascii_lowercase();
        let kind = match lower.as_str() {
            "smbshare" | "share" | "shares" => ObjectKind::SmbShare,
            "smbsecurityconfig" | "security" | "securityconfig" => ObjectKind::SmbSecurityConfig,
            "smbcommonconfig" | "common" | "commonconfig" => ObjectKind::SmbCommonConfig,
            "secret" | "secrets" => ObjectKind::Secret,
            "configmap" | "cm" => ObjectKind::ConfigMap,
            "persistentvolumeclaim" | "pvc" => ObjectKind::PersistentVolumeClaim,
            "deployment" | "deploy" => ObjectKind::Deployment,
            "statefulset" | "sts" => ObjectKind::StatefulSet,
            "service" | "svc" => ObjectKind::Service,
            "event" | "events" => ObjectKind::Event,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
