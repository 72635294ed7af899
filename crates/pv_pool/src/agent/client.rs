use super::{AgentApi, AgentStatus};
use crate::util::errors::{Error, Result, StdError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, warn};

pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_secs(2);

const STATUS_PATH: &str = "/status";
const DECOMMISSION_PATH: &str = "/manage-agent/decommission";

/// HTTP implementation of [`AgentApi`]
#[derive(Clone, Debug)]
pub struct AgentClient {
    client: reqwest::Client,
}

impl AgentClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::StdError(StdError::InvalidConfig(format!(
                    "failed to build storage agent http client: {}",
                    e
                )))
            })?;
        Ok(Self { client })
    }
}

fn unreachable(url: &str, e: reqwest::Error) -> Error {
    let reason = if e.is_timeout() {
        format!("timed out: {}", e)
    } else {
        e.to_string()
    };
    Error::StdError(StdError::AgentUnreachable {
        url: url.to_string(),
        reason,
    })
}

fn protocol_error(url: &str, reason: String) -> Error {
    Error::StdError(StdError::AgentProtocolError {
        url: url.to_string(),
        reason,
    })
}

#[async_trait]
impl AgentApi for AgentClient {
    async fn status(&self, base_url: &str) -> Result<AgentStatus> {
        let url = format!("{}{}", base_url, STATUS_PATH);
        debug!("Fetching storage agent status: {}", url);

        let response = self.client.get(&url).send().await.map_err(|e| {
            error!("Failed to reach storage agent {}: {}", url, e);
            unreachable(&url, e)
        })?;

        if response.status() != reqwest::StatusCode::OK {
            error!("Storage agent {} returned status {}", url, response.status());
            return Err(protocol_error(
                &url,
                format!("unexpected status code {}", response.status()),
            ));
        }

        // a body cut short by the timeout is still a transport failure
        let body = response.bytes().await.map_err(|e| unreachable(&url, e))?;
        serde_json::from_slice::<AgentStatus>(&body).map_err(|e| {
            error!("Failed to parse storage agent status from {}: {}", url, e);
            protocol_error(&url, format!("malformed status body: {}", e))
        })
    }

    async fn decommission(&self, base_url: &str) -> Result<()> {
        let url = format!("{}{}", base_url, DECOMMISSION_PATH);
        debug!("Decommissioning storage agent: {}", url);

        let response = self.client.put(&url).send().await.map_err(|e| {
            error!("Failed to reach storage agent {}: {}", url, e);
            unreachable(&url, e)
        })?;

        if !response.status().is_success() {
            warn!(
                "Storage agent {} answered decommission with status {}",
                url,
                response.status()
            );
        }
        Ok(())
    }
}
