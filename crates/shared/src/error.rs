use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failed remote exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transport,
    MalformedResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },
    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
}

impl GatewayError {
    pub fn transport(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn malformed(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport { .. } | Self::Status { .. } => FailureKind::Transport,
            Self::Malformed { .. } => FailureKind::MalformedResponse,
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.kind() == FailureKind::MalformedResponse
    }
}
