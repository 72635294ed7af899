use thiserror::Error;

#[derive(Error, Debug)]
pub enum StdError {
    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("AgentUnreachable: {url}: {reason}")]
    AgentUnreachable { url: String, reason: String },

    #[error("AgentProtocolError: {url}: {reason}")]
    AgentProtocolError { url: String, reason: String },

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("InvalidConfig: {0}")]
    InvalidConfig(String),
}

impl StdError {
    pub fn metric_label(&self) -> String {
        match self {
            StdError::KubeError(_) => "kube_error",
            StdError::AgentUnreachable { .. } => "agent_unreachable",
            StdError::AgentProtocolError { .. } => "agent_protocol_error",
            StdError::MetadataMissing(_) => "metadata_missing",
            StdError::InvalidConfig(_) => "invalid_config",
        }
        .to_string()
    }
}

/// Error of a reconcile pass. Every failure is retried after the same fixed delay.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
        }
    }

    /// True when the error came from talking to a storage agent rather than the platform.
    pub fn is_agent_error(&self) -> bool {
        let Error::StdError(inner) = self;
        matches!(
            inner,
            StdError::AgentUnreachable { .. } | StdError::AgentProtocolError { .. }
        )
    }
}

impl From<StdError> for Error {
    fn from(e: StdError) -> Self {
        Error::StdError(e)
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::StdError(StdError::KubeError(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_labels_are_short_and_stable() {
        let err = Error::from(StdError::AgentUnreachable {
            url: "http://pool-sts-0.pool-srv.default.svc:8080".to_string(),
            reason: "connection refused".to_string(),
        });
        assert_eq!(err.metric_label(), "agent_unreachable");
        assert!(err.is_agent_error());

        let err = Error::from(StdError::MetadataMissing("namespace".to_string()));
        assert_eq!(err.metric_label(), "metadata_missing");
        assert!(!err.is_agent_error());
    }
}
