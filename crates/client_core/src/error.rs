use shared::{
    domain::{GroupId, QuestionId},
    error::GatewayError,
};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DashboardError {
    #[error("failed to load user info for {username}: {source}")]
    UserFetch {
        username: String,
        source: GatewayError,
    },
    #[error("no dashboard session is loaded")]
    NotLoaded,
    #[error("session for {username} was replaced before the operation completed")]
    StaleSession { username: String },
    #[error("failed to submit question to group {group_id}: {source}")]
    SubmitQuestion {
        group_id: GroupId,
        source: GatewayError,
    },
    #[error("question {question_id} is not confirmed by the server yet")]
    ProvisionalQuestion { question_id: QuestionId },
    #[error("failed to submit answer to question {question_id}: {source}")]
    SubmitAnswer {
        question_id: QuestionId,
        source: GatewayError,
    },
    #[error("failed to create group {name:?}: {source}")]
    CreateGroup { name: String, source: GatewayError },
    #[error("group {group_id} was created but joining it failed: {source}")]
    JoinCreatedGroup {
        group_id: GroupId,
        source: GatewayError,
    },
    #[error("failed to add {username} to group {group_id}: {source}")]
    AddUser {
        group_id: GroupId,
        username: String,
        source: GatewayError,
    },
}

impl DashboardError {
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            Self::UserFetch { source, .. }
            | Self::SubmitQuestion { source, .. }
            | Self::SubmitAnswer { source, .. }
            | Self::CreateGroup { source, .. }
            | Self::JoinCreatedGroup { source, .. }
            | Self::AddUser { source, .. } => Some(source),
            Self::NotLoaded | Self::StaleSession { .. } | Self::ProvisionalQuestion { .. } => None,
        }
    }
}
