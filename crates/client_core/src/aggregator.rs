use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use futures::{stream::FuturesUnordered, StreamExt};
use serde::Serialize;
use shared::{
    domain::{Answer, GroupId, GroupRef, GroupRefError, Question, QuestionId},
    error::{FailureKind, GatewayError},
};
use tracing::{debug, info, warn};

use crate::gateway::RemoteGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStage {
    GroupRef,
    Questions,
    Answers,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupFailure {
    /// `None` when the group reference itself could not be decomposed.
    pub group_id: Option<GroupId>,
    pub stage: FetchStage,
    pub kind: FailureKind,
    pub reason: String,
}

impl GroupFailure {
    fn fetch(group_id: &GroupId, stage: FetchStage, err: &GatewayError) -> Self {
        Self {
            group_id: Some(group_id.clone()),
            stage,
            kind: err.kind(),
            reason: err.to_string(),
        }
    }

    fn malformed_ref(err: &GroupRefError) -> Self {
        Self {
            group_id: None,
            stage: FetchStage::GroupRef,
            kind: FailureKind::MalformedResponse,
            reason: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupContent {
    pub group_id: GroupId,
    pub questions: Vec<Question>,
    pub answers: HashMap<QuestionId, Vec<Answer>>,
    pub failure: Option<GroupFailure>,
}

impl GroupContent {
    fn empty(group_id: &GroupId) -> Self {
        Self {
            group_id: group_id.clone(),
            questions: Vec::new(),
            answers: HashMap::new(),
            failure: None,
        }
    }

    pub fn failed_at(&self, stage: FetchStage) -> bool {
        self.failure
            .as_ref()
            .is_some_and(|failure| failure.stage == stage)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    pub questions_by_group: HashMap<GroupId, Vec<Question>>,
    pub answers_by_question: HashMap<QuestionId, Vec<Answer>>,
    pub failures: Vec<GroupFailure>,
}

impl Aggregation {
    pub fn merge(&mut self, content: GroupContent) {
        self.questions_by_group
            .insert(content.group_id, content.questions);
        self.answers_by_question.extend(content.answers);
        if let Some(failure) = content.failure {
            self.failures.push(failure);
        }
    }

    pub fn record_malformed(&mut self, err: &GroupRefError) {
        self.failures.push(GroupFailure::malformed_ref(err));
    }
}

pub struct GroupAggregator {
    gateway: Arc<dyn RemoteGateway>,
}

impl GroupAggregator {
    pub fn new(gateway: Arc<dyn RemoteGateway>) -> Self {
        Self { gateway }
    }

    pub async fn aggregate(&self, groups: &[GroupRef]) -> Aggregation {
        let mut requested = HashSet::new();
        let mut pending = groups
            .iter()
            .filter(|group| requested.insert(&group.group_id))
            .map(|group| self.fetch_group(&group.group_id))
            .collect::<FuturesUnordered<_>>();

        let mut aggregation = Aggregation::default();
        while let Some(content) = pending.next().await {
            aggregation.merge(content);
        }

        info!(
            groups = aggregation.questions_by_group.len(),
            questions = aggregation.answers_by_question.len(),
            failures = aggregation.failures.len(),
            "aggregate: complete"
        );
        aggregation
    }

    // One batched answer request per group, skipped when there are no questions.
    pub async fn fetch_group(&self, group_id: &GroupId) -> GroupContent {
        let mut content = GroupContent::empty(group_id);

        let questions = match self.gateway.list_group_questions(group_id).await {
            Ok(response) => response.into_questions(),
            Err(err) => {
                warn!(group_id = %group_id, "aggregate: failed to fetch questions: {err}");
                content.failure = Some(GroupFailure::fetch(group_id, FetchStage::Questions, &err));
                return content;
            }
        };

        content.questions = questions
            .into_iter()
            .map(|mut question| {
                if question.group_id.is_empty() {
                    question.group_id = group_id.clone();
                }
                question
            })
            .collect();

        if content.questions.is_empty() {
            debug!(group_id = %group_id, "aggregate: group has no questions");
            return content;
        }

        let question_ids = content
            .questions
            .iter()
            .map(|question| question.question_id.clone())
            .collect::<Vec<_>>();
        content.answers = question_ids
            .iter()
            .map(|question_id| (question_id.clone(), Vec::new()))
            .collect();

        match self.gateway.batch_get_answers(&question_ids).await {
            Ok(mut batch) => {
                for question_id in &question_ids {
                    let Some(answers) = batch.remove(question_id) else {
                        continue;
                    };
                    let answers = answers
                        .into_iter()
                        .map(|mut answer| {
                            if answer.question_id.is_empty() {
                                answer.question_id = question_id.clone();
                            }
                            answer
                        })
                        .collect();
                    content.answers.insert(question_id.clone(), answers);
                }
                if !batch.is_empty() {
                    debug!(
                        group_id = %group_id,
                        ignored = batch.len(),
                        "aggregate: batch returned answers for unknown questions"
                    );
                }
            }
            Err(err) => {
                warn!(group_id = %group_id, "aggregate: failed to fetch batch answers: {err}");
                content.failure = Some(GroupFailure::fetch(group_id, FetchStage::Answers, &err));
            }
        }

        content
    }
}

#[cfg(test)]
#[path = "tests/aggregator_tests.rs"]
mod tests;
