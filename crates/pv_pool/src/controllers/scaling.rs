use crate::agent::AgentApi;
use crate::api::v1::{PvPodState, PvPool, PvPoolPhase, PvPoolStatus};
use crate::controllers::pod_status::agent_url;
use crate::controllers::pool_api::PoolApi;
use crate::controllers::resources::{pool_namespace, service_name};
use crate::util::errors::Result;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{info, warn};

/// What a reconcile pass does to the pool's StatefulSet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDecision {
    /// Raise the replica count to the desired size
    ScaleUp,
    /// Decommission the pods above the desired size
    ScaleDown,
    /// Replica count and ready pods both match the desired size
    Converged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingOutcome {
    pub decision: ScalingDecision,
    /// Replica count written to the StatefulSet, when it was resized
    pub resized_to: Option<i32>,
    /// Pods that were told to decommission in this pass
    pub decommissioned: Vec<String>,
}

/// First matching rule wins.
///
/// A pool whose replica count already matches but whose pods are not all ready falls under
/// the scale up rule, so waiting for pods never gets a decision of its own.
pub fn decide(desired: i32, replicas: i32, ready: i32) -> ScalingDecision {
    if desired >= replicas && ready != desired {
        ScalingDecision::ScaleUp
    } else if desired < replicas {
        ScalingDecision::ScaleDown
    } else {
        ScalingDecision::Converged
    }
}

/// Ordinal of a StatefulSet pod named `<statefulset>-<ordinal>`
pub fn pod_ordinal(pod_name: &str, statefulset_name: &str) -> Option<i32> {
    pod_name
        .strip_prefix(statefulset_name)?
        .strip_prefix('-')?
        .parse::<i32>()
        .ok()
        .filter(|ordinal| *ordinal >= 0)
}

fn replicas(sts: &StatefulSet) -> i32 {
    // the API server defaults an unset replica count to 1
    sts.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1)
}

/// Drives the StatefulSet towards the pool's desired size and sets the phase in `status`.
///
/// `status` must already hold the pod states collected in this pass. Only the scale up branch
/// writes the StatefulSet, scale down only signals the agents and leaves the shrinking itself
/// to the platform.
pub async fn reconcile_statefulset(
    api: &dyn PoolApi,
    agent: &dyn AgentApi,
    pool: &PvPool,
    mut sts: StatefulSet,
    pods: &[Pod],
    status: &mut PvPoolStatus,
) -> Result<ScalingOutcome> {
    let desired = pool.spec.num_pvs;
    let current = replicas(&sts);
    let ready = status.count(PvPodState::Ready);
    let decision = decide(desired, current, ready);
    info!(
        "StatefulSet '{}': desired {}, replicas {}, ready {} -> {:?}",
        sts.name_any(),
        desired,
        current,
        ready,
        decision
    );

    let mut outcome = ScalingOutcome {
        decision,
        resized_to: None,
        decommissioned: Vec::new(),
    };

    match decision {
        ScalingDecision::ScaleUp => {
            status.phase = PvPoolPhase::Scaling;
            if current != desired {
                info!("Scaling StatefulSet '{}' from {} to {}", sts.name_any(), current, desired);
                if let Some(spec) = sts.spec.as_mut() {
                    spec.replicas = Some(desired);
                }
                api.replace_statefulset(&pool_namespace(pool)?, &sts).await?;
                outcome.resized_to = Some(desired);
            }
        }
        ScalingDecision::ScaleDown => {
            status.phase = PvPoolPhase::Scaling;
            outcome.decommissioned =
                decommission_required_pods(agent, pool, &sts.name_any(), pods, status).await?;
        }
        ScalingDecision::Converged => status.phase = PvPoolPhase::Ready,
    }

    Ok(outcome)
}

/// Tells every agent whose ordinal is beyond the desired size to decommission.
///
/// Agents already decommissioning are left alone. The matching `pods_info` entry is marked
/// Decommissioned right away, without waiting for the agent to drain. Any failed call aborts
/// the remaining decommissions of this pass.
async fn decommission_required_pods(
    agent: &dyn AgentApi,
    pool: &PvPool,
    statefulset_name: &str,
    pods: &[Pod],
    status: &mut PvPoolStatus,
) -> Result<Vec<String>> {
    let desired = pool.spec.num_pvs;
    let namespace = pool_namespace(pool)?;
    let service = service_name(pool);
    let mut decommissioned = Vec::new();

    for pod in pods {
        let pod_name = pod.name_any();
        let Some(ordinal) = pod_ordinal(&pod_name, statefulset_name) else {
            warn!(
                "Pod '{}' does not follow the '{}-<ordinal>' naming, skipping",
                pod_name, statefulset_name
            );
            continue;
        };
        if ordinal < desired {
            continue;
        }

        let entry = status.pods_info.iter().position(|info| info.pod_name == pod_name);
        let state = entry
            .map(|i| status.pods_info[i].pod_status)
            .unwrap_or(PvPodState::Unknown);
        if state == PvPodState::Decommissioning {
            continue;
        }

        info!("Decommissioning storage agent '{}' (ordinal {})", pod_name, ordinal);
        agent.decommission(&agent_url(pod, &service, &namespace)).await?;

        if let Some(i) = entry {
            status.pods_info[i].pod_status = PvPodState::Decommissioned;
        }
        decommissioned.push(pod_name);
    }

    Ok(decommissioned)
}
