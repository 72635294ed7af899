use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Generate the Kubernetes wrapper struct `PvPool` from our Spec and Status struct
///
/// This provides a hook for generating the CRD yaml (in crdgen)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(kind = "PvPool", group = "pvpool.noobaa.com", version = "v1", namespaced)]
#[kube(status = "PvPoolStatus", shortname = "pvpool")]
#[serde(rename_all = "camelCase")]
pub struct PvPoolSpec {
    /// Storage agent container image
    pub image: String,
    /// Number of persistent volumes, one storage agent pod per volume
    #[serde(rename = "numPVs")]
    #[schemars(range(min = 0))]
    pub num_pvs: i32,
    /// Size of every persistent volume in GB
    #[serde(rename = "pvSizeGB")]
    #[schemars(range(min = 1))]
    pub pv_size_gb: i32,
    /// Storage class for the volume claims, the cluster default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

// Phase represents the convergence state of a PvPool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum PvPoolPhase {
    #[default]
    #[serde(other)]
    Unknown,
    Scaling,
    Ready,
}

impl fmt::Display for PvPoolPhase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PvPoolPhase::Unknown => write!(f, "Unknown"),
            PvPoolPhase::Scaling => write!(f, "Scaling"),
            PvPoolPhase::Ready => write!(f, "Ready"),
        }
    }
}

/// Lifecycle state of a single pod as reported by its storage agent
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
)]
pub enum PvPodState {
    #[default]
    #[serde(other)]
    Unknown,
    Ready,
    Decommissioning,
    Decommissioned,
}

impl PvPodState {
    /// Maps the state string reported by a storage agent onto a pod state.
    ///
    /// Agents report their state as free text, anything not recognized is `Unknown`.
    pub fn from_agent(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "ready" => PvPodState::Ready,
            "decommissioning" => PvPodState::Decommissioning,
            "decommissioned" => PvPodState::Decommissioned,
            _ => PvPodState::Unknown,
        }
    }
}

impl fmt::Display for PvPodState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PvPodState::Unknown => write!(f, "Unknown"),
            PvPodState::Ready => write!(f, "Ready"),
            PvPodState::Decommissioning => write!(f, "Decommissioning"),
            PvPodState::Decommissioned => write!(f, "Decommissioned"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PvPodInfo {
    pub pod_name: String,
    pub pod_status: PvPodState,
}

/// The status object of `PvPool`
///
/// Recomputed from scratch on every reconcile pass.
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PvPoolStatus {
    #[serde(default)]
    pub phase: PvPoolPhase,
    #[serde(default)]
    pub count_by_state: BTreeMap<PvPodState, i32>,
    #[serde(default)]
    pub pods_info: Vec<PvPodInfo>,
    /// Used storage across the ready pods, in percent
    #[serde(default)]
    pub used_percent: i32,
}

impl PvPoolStatus {
    pub fn count(&self, state: PvPodState) -> i32 {
        self.count_by_state.get(&state).copied().unwrap_or(0)
    }
}
