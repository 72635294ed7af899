use crate::agent::{AgentApi, AgentClient};
use crate::api::v1::{PvPool, PvPoolPhase, PvPoolStatus};
use crate::controllers::pod_status::collect_pods_status;
use crate::controllers::pool_api::{KubePoolApi, PoolApi};
use crate::controllers::resources::{
    ensure_service, ensure_statefulset, label_selector, pool_namespace, service_name,
};
use crate::controllers::scaling::{reconcile_statefulset, ScalingOutcome};
use crate::util::config::OperatorConfig;
use crate::util::errors::{Error, Result};
use crate::util::metrics::Metrics;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::{Api, ListParams, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        watcher::{self, Config},
    },
};
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::RwLock, time::Duration};
use tracing::*;

/// Retry delay after a failed pass and while the pool is converging
pub const RETRY_INTERVAL: Duration = Duration::from_secs(3);
/// Re-check delay once the pool is Ready
pub const READY_INTERVAL: Duration = Duration::from_secs(60);

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

/// State wrapper around the controller outputs for the web server
impl State {
    /// Metrics getter
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    /// State getter
    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    // Create a Controller Context that can update State
    pub fn to_context(
        &self,
        client: Client,
        config: &OperatorConfig,
    ) -> Result<Arc<Context>, anyhow::Error> {
        let api = KubePoolApi::new(client, config.reporter.clone());
        let agent = AgentClient::new(config.agent_timeout)?;
        Ok(Arc::new(Context {
            api: Arc::new(api),
            agent: Arc::new(agent),
            diagnostics: self.diagnostics.clone(),
            metrics: Metrics::new()?.register(&self.registry)?,
        }))
    }
}

// Context for our reconciler
#[derive(Clone)]
pub struct Context {
    /// Orchestration API
    pub api: Arc<dyn PoolApi>,
    /// Storage agent protocol client
    pub agent: Arc<dyn AgentApi>,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    /// Prometheus metrics
    pub metrics: Metrics,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    /// Name and phase of the last pool that completed a pass
    pub last_pool: Option<String>,
    pub last_phase: Option<PvPoolPhase>,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            last_pool: None,
            last_phase: None,
        }
    }
}

/// Delay before the next pass of a pool that reconciled cleanly
pub fn next_action(phase: PvPoolPhase) -> Action {
    match phase {
        PvPoolPhase::Ready => Action::requeue(READY_INTERVAL),
        PvPoolPhase::Unknown | PvPoolPhase::Scaling => Action::requeue(RETRY_INTERVAL),
    }
}

/// Computes a fresh status for `pool`: ensure service, ensure StatefulSet, collect the pod
/// states, then scale.
async fn reconcile_status(ctx: &Context, pool: &PvPool) -> Result<(PvPoolStatus, ScalingOutcome)> {
    let (api, agent) = (ctx.api.as_ref(), ctx.agent.as_ref());
    let ns = pool_namespace(pool)?;
    let mut status = PvPoolStatus::default();

    ensure_service(api, pool).await?;
    let sts = ensure_statefulset(api, pool).await?;

    let pods = api.list_pods(&ns, &label_selector(pool)).await?;
    collect_pods_status(agent, &pods, &service_name(pool), &ns, &mut status).await?;

    let outcome = reconcile_statefulset(api, agent, pool, sts, &pods, &mut status).await?;
    Ok((status, outcome))
}

async fn publish_outcome(ctx: &Context, pool: &PvPool, outcome: &ScalingOutcome) {
    let mut events = Vec::new();
    if let Some(replicas) = outcome.resized_to {
        events.push(("Scaling", format!("Scaled StatefulSet to {} replicas", replicas)));
    }
    if !outcome.decommissioned.is_empty() {
        ctx.metrics.decommissioned(pool, outcome.decommissioned.len());
        events.push((
            "Decommissioning",
            format!("Decommissioning {}", outcome.decommissioned.join(", ")),
        ));
    }
    for (reason, note) in events {
        // events are informational, a failure to publish must not fail the pass
        if let Err(e) = ctx.api.publish_event(pool, reason, note).await {
            warn!("failed to publish {} event for '{}': {}", reason, pool.name_any(), e);
        }
    }
}

/// One reconcile pass over the pool `namespace/name`.
///
/// A deleted pool ends the pass quietly, the owned Service and StatefulSet are garbage
/// collected by the platform. The status is written only when the pass succeeded and the
/// result differs from what is stored.
#[instrument(skip(ctx), fields(pool = %name, namespace = %namespace))]
pub async fn reconcile_pool(ctx: &Context, namespace: &str, name: &str) -> Result<Action> {
    let Some(pool) = ctx.api.get_pool(namespace, name).await? else {
        info!("PvPool not found, it must have been deleted");
        return Ok(Action::await_change());
    };

    let (status, outcome) = reconcile_status(ctx, &pool).await?;
    publish_outcome(ctx, &pool, &outcome).await;

    if pool.status.as_ref() != Some(&status) {
        info!("Updating status, phase {}", status.phase);
        ctx.api.replace_pool_status(&pool, &status).await?;
    }

    {
        let mut diagnostics = ctx.diagnostics.write().await;
        diagnostics.last_pool = Some(format!("{}/{}", namespace, name));
        diagnostics.last_phase = Some(status.phase);
    }

    if status.phase == PvPoolPhase::Ready {
        info!("PvPool is Ready, checking again in {:?}", READY_INTERVAL);
    } else {
        info!("PvPool is {}, checking again in {:?}", status.phase, RETRY_INTERVAL);
    }
    Ok(next_action(status.phase))
}

pub async fn reconcile(pool: Arc<PvPool>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = ctx.metrics.count_and_measure("pvpool");
    ctx.diagnostics.write().await.last_event = Utc::now();

    let ns = pool_namespace(&pool)?;
    reconcile_pool(&ctx, &ns, &pool.name_any()).await
}

pub fn error_policy(pool: Arc<PvPool>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile of PvPool '{}' failed: {}", pool.name_any(), error);
    ctx.metrics.reconcile_failure(&pool, error);
    Action::requeue(RETRY_INTERVAL)
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(state: State, config: OperatorConfig) -> anyhow::Result<()> {
    let client = Client::try_default().await?;

    let (pools, services, statefulsets) = match &config.watch_namespace {
        Some(ns) => (
            Api::<PvPool>::namespaced(client.clone(), ns),
            Api::<Service>::namespaced(client.clone(), ns),
            Api::<StatefulSet>::namespaced(client.clone(), ns),
        ),
        None => (
            Api::<PvPool>::all(client.clone()),
            Api::<Service>::all(client.clone()),
            Api::<StatefulSet>::all(client.clone()),
        ),
    };

    if let Err(e) = pools.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        return Err(e.into());
    }

    let ctx = state.to_context(client, &config)?;
    Controller::new(pools, Config::default().any_semantic())
        .owns(services, watcher::Config::default())
        .owns(statefulsets, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
    Ok(())
}
