use crate::agent::{pod_url, AgentApi};
use crate::api::v1::{PvPodInfo, PvPodState, PvPoolStatus};
use crate::util::errors::Result;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

/// Base url of the storage agent in `pod`.
///
/// StatefulSet pods carry the governing service as their subdomain, the service name is
/// only a fallback for pods that have not been scheduled through it.
pub fn agent_url(pod: &Pod, service_name: &str, namespace: &str) -> String {
    let subdomain = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.subdomain.as_deref())
        .unwrap_or(service_name);
    let pod_namespace = pod.namespace();
    pod_url(
        &pod.name_any(),
        subdomain,
        pod_namespace.as_deref().unwrap_or(namespace),
    )
}

/// `floor(used * 100 / total)` clamped to 0..=100, zero for an empty pool.
pub fn utilization_percent(used: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    let percent = i128::from(used.max(0)) * 100 / i128::from(total);
    percent.min(100) as i32
}

/// Asks every pod's agent for its state and fills `pods_info`, `count_by_state` and
/// `used_percent` of `status`.
///
/// Pods are queried one at a time. The first agent that cannot be queried fails the whole
/// collection, a pool with an unreachable agent gets no status until it recovers.
pub async fn collect_pods_status(
    agent: &dyn AgentApi,
    pods: &[Pod],
    service_name: &str,
    namespace: &str,
    status: &mut PvPoolStatus,
) -> Result<()> {
    let mut used: i64 = 0;
    let mut total: i64 = 0;

    for pod in pods {
        let url = agent_url(pod, service_name, namespace);
        let agent_status = agent.status(&url).await?;
        let state = PvPodState::from_agent(&agent_status.state);
        debug!(
            "Storage agent '{}' reports {} ({} of {} bytes used)",
            pod.name_any(),
            state,
            agent_status.used,
            agent_status.total
        );

        status.pods_info.push(PvPodInfo {
            pod_name: pod.name_any(),
            pod_status: state,
        });
        *status.count_by_state.entry(state).or_insert(0) += 1;

        if state == PvPodState::Ready {
            used = used.saturating_add(agent_status.used);
            total = total.saturating_add(agent_status.total);
        }
    }

    status.used_percent = utilization_percent(used, total);
    info!(
        "Collected status of {} pods, {}% used",
        status.pods_info.len(),
        status.used_percent
    );
    Ok(())
}
