use crate::api::v1::{PvPool, PvPoolStatus};
use crate::util::errors::{Error, Result, StdError};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::{
    api::{Api, ListParams, Patch, PatchParams, PostParams},
    runtime::events::{Event, EventType, Recorder, Reporter},
    Client, Resource, ResourceExt,
};
use serde_json::json;

pub const FIELD_MANAGER: &str = "pvpool-controller";

/// Orchestration API calls made by a reconcile pass.
///
/// Lookups return `None` when the object does not exist.
#[async_trait]
pub trait PoolApi: Send + Sync {
    async fn get_pool(&self, namespace: &str, name: &str) -> Result<Option<PvPool>>;

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>>;

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service>;

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>>;

    async fn create_statefulset(&self, namespace: &str, sts: &StatefulSet) -> Result<StatefulSet>;

    /// Writes back a previously fetched StatefulSet, conflicting writes fail.
    async fn replace_statefulset(&self, namespace: &str, sts: &StatefulSet) -> Result<StatefulSet>;

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>>;

    /// Overwrites the whole status of the pool.
    async fn replace_pool_status(&self, pool: &PvPool, status: &PvPoolStatus) -> Result<()>;

    async fn publish_event(&self, pool: &PvPool, reason: &str, note: String) -> Result<()>;
}

/// [`PoolApi`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubePoolApi {
    client: Client,
    reporter: Reporter,
}

impl KubePoolApi {
    pub fn new(client: Client, reporter: impl Into<Reporter>) -> Self {
        Self {
            client,
            reporter: reporter.into(),
        }
    }
}

async fn get_opt<K>(api: Api<K>, name: &str) -> Result<Option<K>>
where
    K: Clone + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.get(name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(None),
        Err(e) => Err(Error::StdError(StdError::KubeError(e))),
    }
}

#[async_trait]
impl PoolApi for KubePoolApi {
    async fn get_pool(&self, namespace: &str, name: &str) -> Result<Option<PvPool>> {
        get_opt(Api::<PvPool>::namespaced(self.client.clone(), namespace), name).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> Result<Option<Service>> {
        get_opt(Api::<Service>::namespaced(self.client.clone(), namespace), name).await
    }

    async fn create_service(&self, namespace: &str, service: &Service) -> Result<Service> {
        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        Ok(services.create(&PostParams::default(), service).await?)
    }

    async fn get_statefulset(&self, namespace: &str, name: &str) -> Result<Option<StatefulSet>> {
        get_opt(Api::<StatefulSet>::namespaced(self.client.clone(), namespace), name).await
    }

    async fn create_statefulset(&self, namespace: &str, sts: &StatefulSet) -> Result<StatefulSet> {
        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(statefulsets.create(&PostParams::default(), sts).await?)
    }

    async fn replace_statefulset(&self, namespace: &str, sts: &StatefulSet) -> Result<StatefulSet> {
        let statefulsets: Api<StatefulSet> = Api::namespaced(self.client.clone(), namespace);
        Ok(statefulsets
            .replace(&sts.name_any(), &PostParams::default(), sts)
            .await?)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let list = pods.list(&ListParams::default().labels(label_selector)).await?;
        Ok(list.items)
    }

    async fn replace_pool_status(&self, pool: &PvPool, status: &PvPoolStatus) -> Result<()> {
        let namespace = pool.namespace().ok_or_else(|| {
            Error::StdError(StdError::MetadataMissing(format!(
                "PvPool '{}' has no namespace",
                pool.name_any()
            )))
        })?;
        let pools: Api<PvPool> = Api::namespaced(self.client.clone(), &namespace);

        // server side apply drops countByState keys we no longer own
        let patch = Patch::Apply(json!({
            "apiVersion": PvPool::api_version(&()),
            "kind": PvPool::kind(&()),
            "status": status,
        }));
        pools
            .patch_status(&pool.name_any(), &PatchParams::apply(FIELD_MANAGER).force(), &patch)
            .await?;
        Ok(())
    }

    async fn publish_event(&self, pool: &PvPool, reason: &str, note: String) -> Result<()> {
        let recorder = Recorder::new(self.client.clone(), self.reporter.clone());
        recorder
            .publish(
                &Event {
                    type_: EventType::Normal,
                    reason: reason.into(),
                    note: Some(note),
                    action: "Reconciling".into(),
                    secondary: None,
                },
                &pool.object_ref(&()),
            )
            .await?;
        Ok(())
    }
}
