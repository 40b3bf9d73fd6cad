use std::{fmt, str::FromStr, sync::Arc};

use anyhow::anyhow;
use futures::{future::BoxFuture, FutureExt};
use serde::Deserialize;
use shared::{
    domain::{Answer, GroupId, GroupRef, Question, QuestionId, User},
    protocol::{CreateAnswerRequest, CreateQuestionRequest},
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    aggregator::{GroupAggregator, GroupContent},
    error::DashboardError,
    gateway::RemoteGateway,
    membership,
};

/// Prefix of locally generated ids for questions the server has not confirmed yet.
pub const PROVISIONAL_ID_PREFIX: &str = "tmp-";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionReconcile {
    #[default]
    Refresh,
    /// Appends a provisional question right away; the next refresh replaces it.
    Optimistic,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipReconcile {
    #[default]
    Refetch,
    Optimistic,
}

impl FromStr for QuestionReconcile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refresh" => Ok(Self::Refresh),
            "optimistic" => Ok(Self::Optimistic),
            other => Err(anyhow!("unknown question reconcile strategy: {other}")),
        }
    }
}

impl FromStr for MembershipReconcile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "refetch" => Ok(Self::Refetch),
            "optimistic" => Ok(Self::Optimistic),
            other => Err(anyhow!("unknown membership reconcile strategy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    ClearQuestionInput(GroupId),
    ClearAnswerInput(QuestionId),
    AppendQuestion(Question),
    AppendAnswer(Answer),
    ReplaceGroup(GroupContent),
    AppendGroup(GroupRef),
    ReplaceUser(User),
}

pub struct Applied<T> {
    pub value: T,
    pub changes: Vec<StateChange>,
}

impl<T> Applied<T> {
    fn new(value: T, changes: Vec<StateChange>) -> Self {
        Self { value, changes }
    }
}

/// A planned write: `immediate` is applied before any network call, `remote`
/// performs the exchange and yields the reconciliation changes.
pub struct Mutation<T> {
    pub immediate: Vec<StateChange>,
    pub remote: BoxFuture<'static, Result<Applied<T>, DashboardError>>,
}

impl<T> fmt::Debug for Mutation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("immediate", &self.immediate)
            .finish_non_exhaustive()
    }
}

pub struct MutationCoordinator {
    gateway: Arc<dyn RemoteGateway>,
    aggregator: Arc<GroupAggregator>,
    question_reconcile: QuestionReconcile,
    membership_reconcile: MembershipReconcile,
}

impl MutationCoordinator {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        aggregator: Arc<GroupAggregator>,
        question_reconcile: QuestionReconcile,
        membership_reconcile: MembershipReconcile,
    ) -> Self {
        Self {
            gateway,
            aggregator,
            question_reconcile,
            membership_reconcile,
        }
    }

    pub fn submit_question(
        &self,
        username: &str,
        group_id: &GroupId,
        text: &str,
    ) -> Option<Mutation<()>> {
        let text = non_blank(text)?;

        let mut immediate = vec![StateChange::ClearQuestionInput(group_id.clone())];
        if self.question_reconcile == QuestionReconcile::Optimistic {
            immediate.push(StateChange::AppendQuestion(provisional_question(
                username, group_id, &text,
            )));
        }

        let request = CreateQuestionRequest {
            username: username.to_string(),
            group_id: group_id.clone(),
            question: text,
        };
        let gateway = Arc::clone(&self.gateway);
        let aggregator = Arc::clone(&self.aggregator);
        let strategy = self.question_reconcile;
        let group_id = group_id.clone();

        let remote = async move {
            gateway
                .create_question(&request)
                .await
                .map_err(|source| DashboardError::SubmitQuestion {
                    group_id: group_id.clone(),
                    source,
                })?;
            info!(group_id = %group_id, "mutation: question accepted");

            let changes = match strategy {
                QuestionReconcile::Refresh => {
                    vec![StateChange::ReplaceGroup(
                        aggregator.fetch_group(&group_id).await,
                    )]
                }
                QuestionReconcile::Optimistic => Vec::new(),
            };
            Ok(Applied::new((), changes))
        }
        .boxed();

        Some(Mutation { immediate, remote })
    }

    pub fn submit_answer(
        &self,
        username: &str,
        question_id: &QuestionId,
        text: &str,
    ) -> Option<Mutation<Answer>> {
        let text = non_blank(text)?;

        let request = CreateAnswerRequest {
            username: username.to_string(),
            question_id: question_id.clone(),
            answer: text,
        };
        let gateway = Arc::clone(&self.gateway);

        let remote = async move {
            let ack = gateway.create_answer(&request).await.map_err(|source| {
                DashboardError::SubmitAnswer {
                    question_id: request.question_id.clone(),
                    source,
                }
            })?;
            info!(question_id = %request.question_id, "mutation: answer accepted");

            let answer = Answer {
                question_id: request.question_id,
                username: request.username,
                text: request.answer,
                accuracy: ack.accuracy,
            };
            Ok(Applied::new(
                answer.clone(),
                vec![StateChange::AppendAnswer(answer)],
            ))
        }
        .boxed();

        Some(Mutation {
            immediate: vec![StateChange::ClearAnswerInput(question_id.clone())],
            remote,
        })
    }

    pub fn create_group(&self, username: &str, name: &str) -> Option<Mutation<GroupRef>> {
        let name = non_blank(name)?;

        let gateway = Arc::clone(&self.gateway);
        let strategy = self.membership_reconcile;
        let username = username.to_string();

        let remote = async move {
            let group_id = gateway.create_group(&name).await.map_err(|source| {
                DashboardError::CreateGroup {
                    name: name.clone(),
                    source,
                }
            })?;
            info!(group_id = %group_id, "mutation: group created");

            gateway
                .add_user_to_group(&group_id, &username)
                .await
                .map_err(|source| DashboardError::JoinCreatedGroup {
                    group_id: group_id.clone(),
                    source,
                })?;
            info!(group_id = %group_id, username = %username, "mutation: joined created group");

            let group = GroupRef::new(name, group_id);
            let change = match strategy {
                MembershipReconcile::Refetch => match gateway.get_user(&username).await {
                    Ok(record) => {
                        let mut user = membership::resolve(&username, record).user;
                        // The server may not list the group yet; membership is already confirmed.
                        if !user.is_member(&group.group_id) {
                            user.groups.push(group.clone());
                        }
                        StateChange::ReplaceUser(user)
                    }
                    Err(err) => {
                        warn!(
                            group_id = %group.group_id,
                            "mutation: user refetch failed, recording membership locally: {err}"
                        );
                        StateChange::AppendGroup(group.clone())
                    }
                },
                MembershipReconcile::Optimistic => StateChange::AppendGroup(group.clone()),
            };
            Ok(Applied::new(group, vec![change]))
        }
        .boxed();

        Some(Mutation {
            immediate: Vec::new(),
            remote,
        })
    }

    pub fn add_user_to_group(&self, group_id: &GroupId, new_username: &str) -> Option<Mutation<()>> {
        let new_username = non_blank(new_username)?;

        let gateway = Arc::clone(&self.gateway);
        let group_id = group_id.clone();

        let remote = async move {
            gateway
                .add_user_to_group(&group_id, &new_username)
                .await
                .map_err(|source| DashboardError::AddUser {
                    group_id: group_id.clone(),
                    username: new_username.clone(),
                    source,
                })?;
            info!(group_id = %group_id, username = %new_username, "mutation: user added to group");
            Ok(Applied::new((), Vec::new()))
        }
        .boxed();

        Some(Mutation {
            immediate: Vec::new(),
            remote,
        })
    }
}

fn non_blank(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn provisional_question(username: &str, group_id: &GroupId, text: &str) -> Question {
    Question {
        question_id: QuestionId::new(format!("{PROVISIONAL_ID_PREFIX}{}", Uuid::new_v4())),
        group_id: group_id.clone(),
        username: username.to_string(),
        text: text.to_string(),
        provisional: true,
    }
}

#[cfg(test)]
#[path = "tests/mutations_tests.rs"]
mod tests;
