//! Client side of the storage agent status/management protocol.
//!
//! Every pod of a pool runs a storage agent listening on [`STORAGE_AGENT_PORT`].
//! The controller only ever asks an agent for its status or tells it to decommission.

pub mod client;
pub mod types;

pub use client::AgentClient;
pub use types::AgentStatus;

use crate::util::errors::Result;
use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

pub const STORAGE_AGENT_PORT: i32 = 8080;

/// Base URL of the agent running in `pod_name`, addressed through the pool's service subdomain.
pub fn pod_url(pod_name: &str, subdomain: &str, namespace: &str) -> String {
    format!("http://{pod_name}.{subdomain}.{namespace}.svc:{STORAGE_AGENT_PORT}")
}

/// Calls made against a single storage agent.
///
/// Implementations must not retry, the reconcile cadence takes care of that.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AgentApi: Send + Sync {
    /// `GET <base_url>/status`
    async fn status(&self, base_url: &str) -> Result<AgentStatus>;

    /// `PUT <base_url>/manage-agent/decommission`
    ///
    /// Only a transport failure is an error, the agent's reply is not inspected.
    async fn decommission(&self, base_url: &str) -> Result<()>;
}
