//! Operational parameters derived from an instance configuration: the
//! storage claim, server workload, and network service a group needs, plus
//! the config object carrying the shared document.

use crate::instance::InstanceConfiguration;
use crate::CoreError;
use serde::{Deserialize, Serialize};
use smbop_schema::document::DOCUMENT_DATA_KEY;
use smbop_schema::{
    ClaimTemplate, ConfigDocument, DataSpec, DnsRegistration, NodeAffinityTerm, ObjectKind,
    OperatorConfig, PublishMode, SecurityMode, SmbShareSpec,
};
use smbop_store::{Object, ObjectKey, OwnerReference};
use std::collections::BTreeMap;

pub const CONFIG_DIR: &str = "/etc/container-config";
pub const USERS_DIR: &str = "/etc/container-users";
pub const JOIN_DIR: &str = "/var/lib/samba-container/join";
pub const STATE_DIR: &str = "/var/lib/samba";
pub const WINBIND_SOCKETS_DIR: &str = "/run/samba/winbindd";
pub const SVC_WATCH_DIR: &str = "/var/lib/svcwatch";
pub const SERVICE_PORT: u16 = 445;

pub const GROUP_LABEL: &str = "smbop.io/server-group";
pub const SHARE_LABEL: &str = "smbop.io/share";
const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    pub replicas: u32,
    pub service_account_name: String,
    pub selector: BTreeMap<String, String>,
    pub init_containers: Vec<ContainerSpec>,
    pub containers: Vec<ContainerSpec>,
    pub volumes: Vec<VolumeSpec>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub node_affinity: Vec<NodeAffinityTerm>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_anti_affinity: Option<PodAntiAffinity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub image_pull_policy: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeSource {
    ConfigMap { name: String },
    Claim { claim_name: String },
    Secret { secret_name: String },
    EmptyDir,
}

/// Required spreading of clustered replicas across nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodAntiAffinity {
    pub topology_key: String,
    pub match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceType {
    ClusterIP,
    LoadBalancer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    pub selector: BTreeMap<String, String>,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
}

/// Clustered groups run as a stateful set, everything else as a deployment.
pub fn workload_kind_for(share: &SmbShareSpec) -> ObjectKind {
    if share.is_clustered() {
        ObjectKind::StatefulSet
    } else {
        ObjectKind::Deployment
    }
}

pub fn workload_kind(instance: &InstanceConfiguration<'_>) -> ObjectKind {
    workload_kind_for(&instance.share)
}

pub fn desired_replicas(instance: &InstanceConfiguration<'_>) -> u32 {
    if instance.is_clustered() {
        instance.share.min_cluster_size()
    } else {
        1
    }
}

pub fn workload_key(instance: &InstanceConfiguration<'_>) -> ObjectKey {
    ObjectKey::new(
        workload_kind(instance),
        instance.namespace.as_str(),
        instance.group.as_str(),
    )
}

pub fn service_key(instance: &InstanceConfiguration<'_>) -> ObjectKey {
    ObjectKey::new(
        ObjectKind::Service,
        instance.namespace.as_str(),
        instance.group.as_str(),
    )
}

pub fn claim_key(instance: &InstanceConfiguration<'_>) -> ObjectKey {
    ObjectKey::new(
        ObjectKind::PersistentVolumeClaim,
        instance.namespace.as_str(),
        instance.claim_name(),
    )
}

pub fn document_key(namespace: &str, config: &OperatorConfig) -> ObjectKey {
    ObjectKey::new(ObjectKind::ConfigMap, namespace, config.document_name.as_str())
}

fn group_labels(instance: &InstanceConfiguration<'_>) -> BTreeMap<String, String> {
    BTreeMap::from([(GROUP_LABEL.to_owned(), instance.group.to_string())])
}

fn container(config: &OperatorConfig, name: &str, image: &str, args: &[&str]) -> ContainerSpec {
    ContainerSpec {
        name: name.to_owned(),
        image: image.to_owned(),
        image_pull_policy: config.workload_image_pull_policy.clone(),
        args: args.iter().map(|a| (*a).to_owned()).collect(),
        env: BTreeMap::new(),
        volume_mounts: Vec::new(),
        ports: Vec::new(),
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_owned(),
        mount_path: path.to_owned(),
    }
}

/// Value of `SAMBACC_CONFIG`: the document, plus the users file in local
/// user mode.
pub fn sambacc_config_path(instance: &InstanceConfiguration<'_>) -> String {
    let mut path = format!("{CONFIG_DIR}/{DOCUMENT_DATA_KEY}");
    if let Some(security) = instance.security_spec() {
        if security.mode == SecurityMode::User {
            if let Some(users) = &security.users {
                path.push_str(&format!(":{USERS_DIR}/{}", users.key));
            }
        }
    }
    path
}

fn join_files(instance: &InstanceConfiguration<'_>) -> Vec<String> {
    let Some(security) = instance.security_spec() else {
        return Vec::new();
    };
    if security.mode != SecurityMode::ActiveDirectory {
        return Vec::new();
    }
    security
        .join_sources
        .iter()
        .enumerate()
        .map(|(i, j)| format!("{JOIN_DIR}/{i}/{}", j.user_join.key))
        .collect()
}

pub fn workload_spec(instance: &InstanceConfiguration<'_>) -> WorkloadSpec {
    let config = instance.config;
    let claim = instance.claim_name();
    let ad = instance.is_domain_joined();

    let mut volumes = vec![
        VolumeSpec {
            name: "samba-container-config".to_owned(),
            source: VolumeSource::ConfigMap {
                name: config.document_name.clone(),
            },
        },
        VolumeSpec {
            name: claim.clone(),
            source: VolumeSource::Claim {
                claim_name: claim.clone(),
            },
        },
        VolumeSpec {
            name: "samba-state".to_owned(),
            source: VolumeSource::EmptyDir,
        },
    ];
    let mut mounts = vec![
        mount("samba-container-config", CONFIG_DIR),
        mount(&claim, &format!("/mnt/{claim}")),
        mount("samba-state", STATE_DIR),
    ];

    if let Some(security) = instance.security_spec() {
        if security.mode == SecurityMode::User {
            if let Some(users) = &security.users {
                volumes.push(VolumeSpec {
                    name: "users-config".to_owned(),
                    source: VolumeSource::Secret {
                        secret_name: users.secret.clone(),
                    },
                });
                mounts.push(mount("users-config", USERS_DIR));
            }
        }
    }

    let mut join_mounts = Vec::new();
    if ad {
        if let Some(security) = instance.security_spec() {
            for (i, source) in security.join_sources.iter().enumerate() {
                let name = format!("join-data-{i}");
                volumes.push(VolumeSpec {
                    name: name.clone(),
                    source: VolumeSource::Secret {
                        secret_name: source.user_join.secret.clone(),
                    },
                });
                join_mounts.push(mount(&name, &format!("{JOIN_DIR}/{i}")));
            }
        }
        volumes.push(VolumeSpec {
            name: "winbind-sockets".to_owned(),
            source: VolumeSource::EmptyDir,
        });
        mounts.push(mount("winbind-sockets", WINBIND_SOCKETS_DIR));
    }

    let env = BTreeMap::from([
        ("SAMBACC_CONFIG".to_owned(), sambacc_config_path(instance)),
        ("SAMBA_CONTAINER_ID".to_owned(), instance.group.to_string()),
    ]);
    let image = config.smbd_container_image.as_str();
    let with_env = |mut c: ContainerSpec, extra_mounts: &[VolumeMount]| {
        c.env.clone_from(&env);
        c.volume_mounts = mounts.clone();
        c.volume_mounts.extend_from_slice(extra_mounts);
        c
    };

    let mut init_containers = vec![with_env(container(config, "init", image, &["init"]), &[])];
    if ad {
        let mut args = vec!["must-join".to_owned(), "--files".to_owned()];
        args.extend(join_files(instance).into_iter().map(|f| format!("--join-file={f}")));
        let mut must_join = with_env(container(config, "must-join", image, &[]), &join_mounts);
        must_join.args = args;
        init_containers.push(must_join);
    }

    let mut smbd = with_env(
        container(config, &config.smbd_container_name, image, &["run", "smbd"]),
        &[],
    );
    smbd.ports = vec![config.smb_port];
    let mut containers = vec![smbd];
    if ad {
        containers.push(with_env(
            container(
                config,
                &config.winbind_container_name,
                image,
                &["run", "winbindd"],
            ),
            &[],
        ));
    }
    if instance.dns_registration() != DnsRegistration::Never {
        let status = format!("{SVC_WATCH_DIR}/status.json");
        let mut watch = container(
            config,
            "svc-watch",
            &config.svc_watch_container_image,
            &[],
        );
        watch.volume_mounts = vec![mount("svcwatch", SVC_WATCH_DIR)];
        watch.env = BTreeMap::from([
            ("DESTINATION_PATH".to_owned(), status.clone()),
            ("SERVICE_LABEL_KEY".to_owned(), GROUP_LABEL.to_owned()),
            ("SERVICE_LABEL_VALUE".to_owned(), instance.group.to_string()),
        ]);
        let mut register = with_env(
            container(config, "dns-register", image, &["dns-register", "--watch"]),
            &[mount("svcwatch", SVC_WATCH_DIR)],
        );
        if instance.dns_registration() == DnsRegistration::ClusterAddress {
            register.args.push("--target=internal".to_owned());
        }
        register.args.push(status);
        volumes.push(VolumeSpec {
            name: "svcwatch".to_owned(),
            source: VolumeSource::EmptyDir,
        });
        containers.push(watch);
        containers.push(register);
    }

    let labels = group_labels(instance);
    let (node_selector, node_affinity) = instance
        .common_spec()
        .map(|c| {
            (
                c.pod_settings.node_selector.clone(),
                c.pod_settings.affinity.clone(),
            )
        })
        .unwrap_or_default();

    WorkloadSpec {
        replicas: desired_replicas(instance),
        service_account_name: config.service_account_name.clone(),
        selector: labels.clone(),
        init_containers,
        containers,
        volumes,
        node_selector,
        node_affinity,
        pod_anti_affinity: instance.is_clustered().then(|| PodAntiAffinity {
            topology_key: HOSTNAME_TOPOLOGY_KEY.to_owned(),
            match_labels: labels,
        }),
    }
}

pub fn service_spec(instance: &InstanceConfiguration<'_>) -> ServiceSpec {
    ServiceSpec {
        service_type: match instance.publish_mode() {
            PublishMode::Cluster => ServiceType::ClusterIP,
            PublishMode::External => ServiceType::LoadBalancer,
        },
        selector: group_labels(instance),
        ports: vec![ServicePort {
            name: "smb".to_owned(),
            port: SERVICE_PORT,
            target_port: instance.config.smb_port,
        }],
    }
}

fn owned_object(
    key: ObjectKey,
    spec: &impl Serialize,
    instance: &InstanceConfiguration<'_>,
    owner: OwnerReference,
) -> Result<Object, CoreError> {
    Ok(Object::new(key, spec)?
        .with_label(GROUP_LABEL, &instance.group)
        .with_owner(owner))
}

/// The claim for a share with an embedded template. `None` when the share
/// uses a pre-existing claim.
pub fn claim_object(
    instance: &InstanceConfiguration<'_>,
    owner: OwnerReference,
) -> Result<Option<Object>, CoreError> {
    if !instance.claim_is_templated() {
        return Ok(None);
    }
    let Some(template): Option<&ClaimTemplate> = instance.share.storage.pvc.spec.as_ref() else {
        return Ok(None);
    };
    Ok(Some(
        Object::new(claim_key(instance), template)?
            .with_label(SHARE_LABEL, &instance.name)
            .with_owner(owner),
    ))
}

pub fn workload_object(
    instance: &InstanceConfiguration<'_>,
    owner: OwnerReference,
) -> Result<Object, CoreError> {
    owned_object(workload_key(instance), &workload_spec(instance), instance, owner)
}

pub fn service_object(
    instance: &InstanceConfiguration<'_>,
    owner: OwnerReference,
) -> Result<Object, CoreError> {
    owned_object(service_key(instance), &service_spec(instance), instance, owner)
}

/// The config object holding `doc`. It carries no owner: it outlives any
/// single share and is removed explicitly once the namespace is empty.
pub fn document_object(
    namespace: &str,
    config: &OperatorConfig,
    doc: &ConfigDocument,
) -> Result<Object, CoreError> {
    Ok(Object::new(document_key(namespace, config), &document_data(namespace, doc)?)?)
}

pub fn document_data(namespace: &str, doc: &ConfigDocument) -> Result<DataSpec, CoreError> {
    let json = doc.to_json().map_err(|e| CoreError::MalformedDocument {
        namespace: namespace.to_owned(),
        reason: e.to_string(),
    })?;
    Ok(DataSpec {
        data: BTreeMap::from([(DOCUMENT_DATA_KEY.to_owned(), json)]),
    })
}

/// Decode the document held by a config object. A missing data key reads as
/// an empty document; anything unparsable is an error, never replaced.
pub fn read_document(obj: &Object) -> Result<ConfigDocument, CoreError> {
    let malformed = |reason: String| CoreError::MalformedDocument {
        namespace: obj.key.namespace.clone(),
        reason,
    };
    let data: DataSpec = obj.spec_as().map_err(|e| malformed(e.to_string()))?;
    match data.data.get(DOCUMENT_DATA_KEY) {
        None => Ok(ConfigDocument::new()),
        Some(json) => ConfigDocument::from_json(json).map_err(|e| malformed(e.to_string())),
    }
}
