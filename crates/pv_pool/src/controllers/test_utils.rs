//! In-memory stand-ins for the orchestration API used by the controller tests.

use crate::api::v1::{PvPool, PvPoolSpec, PvPoolStatus};
use crate::controllers::pool_api::PoolApi;
use crate::controllers::resources::{pool_labels, service_name, statefulset_name};
use crate::util::errors::{Error, Result, StdError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, PodSpec, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::sync::Mutex;

pub const TEST_NAMESPACE: &str = "storage";

pub fn test_pool(name: &str, num_pvs: i32) -> PvPool {
    let mut pool = PvPool::new(
        name,
        PvPoolSpec {
            image: "noobaa/noobaa-core:test".to_string(),
            num_pvs,
            pv_size_gb: 10,
            storage_class: None,
        },
    );
    pool.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    pool.metadata.uid = Some(format!("uid-{}", name));
    pool
}

/// Pod `<pool>-sts-<ordinal>` as the StatefulSet controller would create it
pub fn test_pod(pool: &PvPool, ordinal: i32) -> Pod {
    named_pod(pool, &format!("{}-{}", statefulset_name(pool), ordinal))
}

pub fn named_pod(pool: &PvPool, name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(TEST_NAMESPACE.to_string()),
            labels: Some(pool_labels(pool)),
            ..Default::default()
        },
        spec: Some(PodSpec {
            hostname: Some(name.to_string()),
            subdomain: Some(service_name(pool)),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Agent url the collector derives for the pod at `ordinal`
pub fn agent_url_of(pool: &PvPool, ordinal: i32) -> String {
    format!(
        "http://{}-{}.{}.{}.svc:8080",
        statefulset_name(pool),
        ordinal,
        service_name(pool),
        TEST_NAMESPACE
    )
}

#[derive(Default)]
struct Objects {
    pools: BTreeMap<String, PvPool>,
    services: BTreeMap<String, Service>,
    statefulsets: BTreeMap<String, StatefulSet>,
    pods: Vec<Pod>,
    creates: usize,
    replaces: usize,
    status_writes: usize,
    events: Vec<String>,
    fail_list_pods: bool,
}

/// Orchestration API over plain maps, counting every mutating call
#[derive(Default)]
pub struct FakePoolApi {
    objects: Mutex<Objects>,
}

impl FakePoolApi {
    pub fn with_pool(pool: PvPool) -> Self {
        let api = Self::default();
        api.objects.lock().unwrap().pools.insert(pool.name_any(), pool);
        api
    }

    pub fn add_statefulset(&self, sts: StatefulSet) {
        self.objects.lock().unwrap().statefulsets.insert(sts.name_any(), sts);
    }

    pub fn add_service(&self, service: Service) {
        self.objects.lock().unwrap().services.insert(service.name_any(), service);
    }

    pub fn add_pod(&self, pod: Pod) {
        self.objects.lock().unwrap().pods.push(pod);
    }

    pub fn fail_list_pods(&self) {
        self.objects.lock().unwrap().fail_list_pods = true;
    }

    pub fn pool(&self, name: &str) -> Option<PvPool> {
        self.objects.lock().unwrap().pools.get(name).cloned()
    }

    pub fn statefulset(&self, name: &str) -> Option<StatefulSet> {
        self.objects.lock().unwrap().statefulsets.get(name).cloned()
    }

    pub fn creates(&self) -> usize {
        self.objects.lock().unwrap().creates
    }

    pub fn replaces(&self) -> usize {
        self.objects.lock().unwrap().replaces
    }

    pub fn status_writes(&self) -> usize {
        self.objects.lock().unwrap().status_writes
    }

    /// Creates, replaces and status writes together
    pub fn mutations(&self) -> usize {
        let objects = self.objects.lock().unwrap();
        objects.creates + objects.replaces + objects.status_writes
    }

    pub fn events(&self) -> Vec<String> {
        self.objects.lock().unwrap().events.clone()
    }
}

#[async_trait]
impl PoolApi for FakePoolApi {
    async fn get_pool(&self, _namespace: &str, name: &str) -> Result<Option<PvPool>> {
        Ok(self.pool(name))
    }

    async fn get_service(&self, _namespace: &str, name: &str) -> Result<Option<Service>> {
        Ok(self.objects.lock().unwrap().services.get(name).cloned())
    }

    async fn create_service(&self, _namespace: &str, service: &Service) -> Result<Service> {
        let mut objects = self.objects.lock().unwrap();
        objects.creates += 1;
        objects.services.insert(service.name_any(), service.clone());
        Ok(service.clone())
    }

    async fn get_statefulset(&self, _namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        Ok(self.statefulset(name))
    }

    async fn create_statefulset(&self, _namespace: &str, sts: &StatefulSet) -> Result<StatefulSet> {
        let mut objects = self.objects.lock().unwrap();
        objects.creates += 1;
        objects.statefulsets.insert(sts.name_any(), sts.clone());
        Ok(sts.clone())
    }

    async fn replace_statefulset(
        &self,
        _namespace: &str,
        sts: &StatefulSet,
    ) -> Result<StatefulSet> {
        let mut objects = self.objects.lock().unwrap();
        objects.replaces += 1;
        objects.statefulsets.insert(sts.name_any(), sts.clone());
        Ok(sts.clone())
    }

    async fn list_pods(&self, _namespace: &str, _label_selector: &str) -> Result<Vec<Pod>> {
        let objects = self.objects.lock().unwrap();
        if objects.fail_list_pods {
            return Err(Error::StdError(StdError::MetadataMissing(
                "pod list unavailable".to_string(),
            )));
        }
        Ok(objects.pods.clone())
    }

    async fn replace_pool_status(&self, pool: &PvPool, status: &PvPoolStatus) -> Result<()> {
        let mut objects = self.objects.lock().unwrap();
        objects.status_writes += 1;
        if let Some(stored) = objects.pools.get_mut(&pool.name_any()) {
            stored.status = Some(status.clone());
        }
        Ok(())
    }

    async fn publish_event(&self, _pool: &PvPool, reason: &str, _note: String) -> Result<()> {
        self.objects.lock().unwrap().events.push(reason.to_string());
        Ok(())
    }
}
