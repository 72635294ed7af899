use serde::{Deserialize, Serialize};

/// Body of `GET /status` as reported by a storage agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub name: String,
    pub total: i64,
    pub used: i64,
    pub state: String,
}
