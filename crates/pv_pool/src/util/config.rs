use crate::agent::client::DEFAULT_AGENT_TIMEOUT;
use crate::util::errors::StdError;
use std::env;
use std::time::Duration;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REPORTER: &str = "pvpool-controller";

/// Operator settings, read from the environment at startup
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorConfig {
    /// Address of the health/metrics server
    pub bind_addr: String,
    /// Only watch PvPools in this namespace, all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Timeout of every storage agent request
    pub agent_timeout: Duration,
    /// Reporter name on published events
    pub reporter: String,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            watch_namespace: None,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
            reporter: DEFAULT_REPORTER.to_string(),
        }
    }
}

impl OperatorConfig {
    pub fn from_env() -> Result<Self, StdError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StdError> {
        let defaults = Self::default();

        let agent_timeout = match lookup("AGENT_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    StdError::InvalidConfig(format!(
                        "AGENT_TIMEOUT_SECS must be a whole number, got '{raw}'"
                    ))
                })?;
                if secs == 0 {
                    return Err(StdError::InvalidConfig(
                        "AGENT_TIMEOUT_SECS must be greater than zero".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => defaults.agent_timeout,
        };

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            watch_namespace: lookup("WATCH_NAMESPACE").filter(|ns| !ns.is_empty()),
            agent_timeout,
            reporter: lookup("EVENT_REPORTER").unwrap_or(defaults.reporter),
        })
    }
}
