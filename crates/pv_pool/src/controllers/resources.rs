use crate::agent::STORAGE_AGENT_PORT;
use crate::api::v1::PvPool;
use crate::controllers::pool_api::PoolApi;
use crate::util::errors::{Error, Result, StdError};

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec,
    PodTemplateSpec, ResourceRequirements, Service, ServicePort, ServiceSpec, VolumeMount,
    VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::{Resource, ResourceExt};

use std::collections::BTreeMap;
use tracing::info;

pub const DATA_MOUNT_PATH: &str = "/data";
pub const POOL_LABEL: &str = "pv-pool";

const AGENT_CONTAINER_NAME: &str = "storage-agent";
const AGENT_PORT_NAME: &str = "storage-agent-api";
const VOLUME_NAME: &str = "vol";
// small enough to let every replica start on a weak cluster
const AGENT_CPU: &str = "100m";
const AGENT_MEMORY: &str = "100M";

pub fn service_name(pool: &PvPool) -> String {
    format!("{}-srv", pool.name_any())
}

pub fn statefulset_name(pool: &PvPool) -> String {
    format!("{}-sts", pool.name_any())
}

pub fn pool_labels(pool: &PvPool) -> BTreeMap<String, String> {
    BTreeMap::from([(POOL_LABEL.to_string(), pool.name_any())])
}

pub fn label_selector(pool: &PvPool) -> String {
    format!("{}={}", POOL_LABEL, pool.name_any())
}

pub fn pool_namespace(pool: &PvPool) -> Result<String> {
    pool.namespace().ok_or_else(|| {
        Error::StdError(StdError::MetadataMissing(format!(
            "PvPool '{}' has no namespace",
            pool.name_any()
        )))
    })
}

fn owner_reference(pool: &PvPool) -> Result<OwnerReference> {
    pool.controller_owner_ref(&()).ok_or_else(|| {
        Error::StdError(StdError::MetadataMissing(format!(
            "PvPool '{}' has no uid to own resources",
            pool.name_any()
        )))
    })
}

/// ClusterIP service in front of the storage agents of a pool
pub fn desired_service(pool: &PvPool) -> Result<Service> {
    let labels = pool_labels(pool);
    Ok(Service {
        metadata: ObjectMeta {
            name: Some(service_name(pool)),
            namespace: Some(pool_namespace(pool)?),
            owner_references: Some(vec![owner_reference(pool)?]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels),
            ports: Some(vec![ServicePort {
                name: Some(AGENT_PORT_NAME.to_string()),
                port: STORAGE_AGENT_PORT,
                target_port: Some(IntOrString::Int(STORAGE_AGENT_PORT)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// StatefulSet running one storage agent per persistent volume
pub fn desired_statefulset(pool: &PvPool) -> Result<StatefulSet> {
    let labels = pool_labels(pool);
    let resources = BTreeMap::from([
        ("cpu".to_string(), Quantity(AGENT_CPU.to_string())),
        ("memory".to_string(), Quantity(AGENT_MEMORY.to_string())),
    ]);
    // GB here means GiB, pvSizeGB * 1024^3 bytes
    let storage = BTreeMap::from([(
        "storage".to_string(),
        Quantity(format!("{}Gi", pool.spec.pv_size_gb)),
    )]);

    Ok(StatefulSet {
        metadata: ObjectMeta {
            name: Some(statefulset_name(pool)),
            namespace: Some(pool_namespace(pool)?),
            owner_references: Some(vec![owner_reference(pool)?]),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(pool.spec.num_pvs),
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..Default::default()
            },
            service_name: Some(service_name(pool)),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: AGENT_CONTAINER_NAME.to_string(),
                        image: Some(pool.spec.image.clone()),
                        command: Some(vec!["node".to_string(), "storage-agent.js".to_string()]),
                        env: Some(vec![EnvVar {
                            name: "PV_PATH".to_string(),
                            value: Some(DATA_MOUNT_PATH.to_string()),
                            ..Default::default()
                        }]),
                        ports: Some(vec![ContainerPort {
                            name: Some(AGENT_PORT_NAME.to_string()),
                            container_port: STORAGE_AGENT_PORT,
                            ..Default::default()
                        }]),
                        resources: Some(ResourceRequirements {
                            limits: Some(resources.clone()),
                            requests: Some(resources),
                            ..Default::default()
                        }),
                        volume_mounts: Some(vec![VolumeMount {
                            name: VOLUME_NAME.to_string(),
                            mount_path: DATA_MOUNT_PATH.to_string(),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            volume_claim_templates: Some(vec![PersistentVolumeClaim {
                metadata: ObjectMeta {
                    name: Some(VOLUME_NAME.to_string()),
                    ..Default::default()
                },
                spec: Some(PersistentVolumeClaimSpec {
                    access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                    storage_class_name: pool.spec.storage_class.clone(),
                    resources: Some(VolumeResourceRequirements {
                        requests: Some(storage),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Returns the pool's service, creating it when missing. An existing service is never updated.
pub async fn ensure_service(api: &dyn PoolApi, pool: &PvPool) -> Result<Service> {
    let ns = pool_namespace(pool)?;
    let name = service_name(pool);

    if let Some(existing) = api.get_service(&ns, &name).await? {
        info!("Service '{}' already exists", name);
        return Ok(existing);
    }

    info!("Creating Service '{}' in namespace '{}'", name, ns);
    api.create_service(&ns, &desired_service(pool)?).await
}

/// Returns the pool's StatefulSet, creating it when missing.
///
/// Drift of an existing StatefulSet (image, volume size) is left alone, only the scaling
/// engine touches it afterwards.
pub async fn ensure_statefulset(api: &dyn PoolApi, pool: &PvPool) -> Result<StatefulSet> {
    let ns = pool_namespace(pool)?;
    let name = statefulset_name(pool);

    if let Some(existing) = api.get_statefulset(&ns, &name).await? {
        info!("StatefulSet '{}' already exists", name);
        return Ok(existing);
    }

    info!(
        "Creating StatefulSet '{}' with {} replicas in namespace '{}'",
        name, pool.spec.num_pvs, ns
    );
    api.create_statefulset(&ns, &desired_statefulset(pool)?).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_utils::{test_pool, FakePoolApi};

    #[test]
    fn names_follow_the_pool_name() {
        let pool = test_pool("alpha", 3);
        assert_eq!(service_name(&pool), "alpha-srv");
        assert_eq!(statefulset_name(&pool), "alpha-sts");
        assert_eq!(label_selector(&pool), "pv-pool=alpha");
    }

    #[test]
    fn service_exposes_the_agent_port() {
        let pool = test_pool("alpha", 3);
        let service = desired_service(&pool).unwrap();
        let spec = service.spec.unwrap();
        assert_eq!(spec.type_.as_deref(), Some("ClusterIP"));
        assert_eq!(spec.selector, Some(pool_labels(&pool)));
        let port = &spec.ports.unwrap()[0];
        assert_eq!(port.port, 8080);
        assert_eq!(port.target_port, Some(IntOrString::Int(8080)));
        assert_eq!(port.name.as_deref(), Some("storage-agent-api"));

        let owner = &service.metadata.owner_references.unwrap()[0];
        assert_eq!(owner.kind, "PvPool");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn statefulset_is_built_from_the_pool_spec() {
        let mut pool = test_pool("alpha", 4);
        pool.spec.pv_size_gb = 16;
        pool.spec.storage_class = Some("fast".to_string());

        let sts = desired_statefulset(&pool).unwrap();
        assert_eq!(sts.metadata.name.as_deref(), Some("alpha-sts"));
        let spec = sts.spec.unwrap();
        assert_eq!(spec.replicas, Some(4));
        assert_eq!(spec.service_name.as_deref(), Some("alpha-srv"));
        assert_eq!(spec.selector.match_labels, Some(pool_labels(&pool)));

        let pod_spec = spec.template.spec.unwrap();
        let container = &pod_spec.containers[0];
        assert_eq!(container.image.as_deref(), Some("noobaa/noobaa-core:test"));
        let resources = container.resources.clone().unwrap();
        assert_eq!(resources.requests, resources.limits);
        assert_eq!(
            resources.requests.unwrap().get("cpu"),
            Some(&Quantity("100m".to_string()))
        );
        let mount = &container.volume_mounts.as_ref().unwrap()[0];
        assert_eq!((mount.name.as_str(), mount.mount_path.as_str()), ("vol", "/data"));

        let claim = &spec.volume_claim_templates.unwrap()[0];
        let claim_spec = claim.spec.clone().unwrap();
        assert_eq!(claim_spec.access_modes, Some(vec!["ReadWriteOnce".to_string()]));
        assert_eq!(claim_spec.storage_class_name.as_deref(), Some("fast"));
        assert_eq!(
            claim_spec.resources.unwrap().requests.unwrap().get("storage"),
            Some(&Quantity("16Gi".to_string()))
        );
    }

    #[test]
    fn pool_without_uid_cannot_own_resources() {
        let mut pool = test_pool("alpha", 1);
        pool.metadata.uid = None;
        assert!(desired_service(&pool).is_err());
        assert!(desired_statefulset(&pool).is_err());
    }

    #[tokio::test]
    async fn ensure_creates_once_and_then_returns_existing() {
        let api = FakePoolApi::default();
        let pool = test_pool("alpha", 2);

        let created = ensure_statefulset(&api, &pool).await.unwrap();
        ensure_service(&api, &pool).await.unwrap();
        assert_eq!(api.creates(), 2);

        // a changed spec does not touch the existing objects
        let mut changed = pool.clone();
        changed.spec.num_pvs = 7;
        changed.spec.image = "noobaa/noobaa-core:next".to_string();
        let existing = ensure_statefulset(&api, &changed).await.unwrap();
        ensure_service(&api, &changed).await.unwrap();

        assert_eq!(api.creates(), 2);
        assert_eq!(existing.spec.unwrap().replicas, created.spec.unwrap().replicas);
    }
}
