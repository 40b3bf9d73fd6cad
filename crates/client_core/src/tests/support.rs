use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use serde_json::{json, Value};
use shared::{
    domain::{Answer, GroupId, Question, QuestionId},
    error::GatewayError,
    protocol::{
        BatchAnswersResponse, CreateAnswerAck, CreateAnswerRequest, CreateQuestionRequest,
        QuestionEnvelope, QuestionListResponse, UserRecord,
    },
};
use tokio::sync::{Mutex, Notify};

use crate::gateway::RemoteGateway;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GatewayCall {
    GetUser(String),
    ListQuestions(GroupId),
    BatchAnswers(Vec<QuestionId>),
    CreateQuestion(CreateQuestionRequest),
    CreateAnswer(CreateAnswerRequest),
    CreateGroup(String),
    AddUser(GroupId, String),
}

/// Holds a gated call until the test releases it.
#[derive(Default)]
pub(crate) struct CallGate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
struct Script {
    users: HashMap<String, Value>,
    questions: HashMap<GroupId, (Vec<Question>, bool)>,
    answers: HashMap<QuestionId, Vec<Answer>>,
    group_names: HashMap<GroupId, String>,
    failing_questions: HashSet<GroupId>,
    failing_batches: bool,
    fail_create_question: bool,
    fail_create_answer: bool,
    fail_create_group: bool,
    fail_add_user: bool,
    accuracy: Option<f64>,
    next_group_id: u32,
    next_question_id: u32,
}

/// In-memory server double: answers from a script and records every call.
pub(crate) struct ScriptedGateway {
    script: Mutex<Script>,
    calls: Mutex<Vec<GatewayCall>>,
    answer_gate: Option<Arc<CallGate>>,
    questions_gate: Option<(GroupId, Arc<CallGate>)>,
}

fn unavailable(endpoint: &str) -> GatewayError {
    GatewayError::Status {
        endpoint: endpoint.to_string(),
        status: 503,
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                next_group_id: 100,
                next_question_id: 1000,
                ..Script::default()
            }),
            calls: Mutex::new(Vec::new()),
            answer_gate: None,
            questions_gate: None,
        }
    }

    pub fn with_answer_gate(mut self, gate: Arc<CallGate>) -> Self {
        self.answer_gate = Some(gate);
        self
    }

    pub fn with_questions_gate(mut self, group_id: &str, gate: Arc<CallGate>) -> Self {
        self.questions_gate = Some((GroupId::from(group_id), gate));
        self
    }

    pub fn user(self, username: &str, groups: Value) -> Self {
        self.script.try_lock().expect("script").users.insert(
            username.to_string(),
            json!({
                "firstName": "First",
                "middleName": "",
                "lastName": "Last",
                "groups": groups,
            }),
        );
        self
    }

    pub fn questions(self, group_id: &str, questions: Value) -> Self {
        self.set_questions(group_id, questions, false)
    }

    pub fn wrapped_questions(self, group_id: &str, questions: Value) -> Self {
        self.set_questions(group_id, questions, true)
    }

    fn set_questions(self, group_id: &str, questions: Value, wrapped: bool) -> Self {
        let questions: Vec<Question> = serde_json::from_value(questions).expect("questions");
        self.script
            .try_lock()
            .expect("script")
            .questions
            .insert(GroupId::from(group_id), (questions, wrapped));
        self
    }

    pub fn answers(self, question_id: &str, answers: Value) -> Self {
        let answers: Vec<Answer> = serde_json::from_value(answers).expect("answers");
        self.script
            .try_lock()
            .expect("script")
            .answers
            .insert(QuestionId::from(question_id), answers);
        self
    }

    pub fn failing_questions(self, group_id: &str) -> Self {
        self.script
            .try_lock()
            .expect("script")
            .failing_questions
            .insert(GroupId::from(group_id));
        self
    }

    pub fn failing_batches(self) -> Self {
        self.script.try_lock().expect("script").failing_batches = true;
        self
    }

    pub fn failing_create_question(self) -> Self {
        self.script.try_lock().expect("script").fail_create_question = true;
        self
    }

    pub fn failing_create_answer(self) -> Self {
        self.script.try_lock().expect("script").fail_create_answer = true;
        self
    }

    pub fn failing_create_group(self) -> Self {
        self.script.try_lock().expect("script").fail_create_group = true;
        self
    }

    pub fn failing_add_user(self) -> Self {
        self.script.try_lock().expect("script").fail_add_user = true;
        self
    }

    pub fn accuracy(self, accuracy: f64) -> Self {
        self.script.try_lock().expect("script").accuracy = Some(accuracy);
        self
    }

    pub async fn set_failing_questions(&self, group_id: &str, failing: bool) {
        let mut script = self.script.lock().await;
        if failing {
            script.failing_questions.insert(GroupId::from(group_id));
        } else {
            script.failing_questions.remove(&GroupId::from(group_id));
        }
    }

    pub async fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().await.clone()
    }

    pub async fn batch_calls(&self) -> Vec<Vec<QuestionId>> {
        self.calls()
            .await
            .into_iter()
            .filter_map(|call| match call {
                GatewayCall::BatchAnswers(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    async fn record(&self, call: GatewayCall) {
        self.calls.lock().await.push(call);
    }
}

#[async_trait]
impl RemoteGateway for ScriptedGateway {
    async fn get_user(&self, username: &str) -> Result<UserRecord, GatewayError> {
        self.record(GatewayCall::GetUser(username.to_string())).await;
        let script = self.script.lock().await;
        let record = script.users.get(username).cloned().ok_or(GatewayError::Status {
            endpoint: "/users/get".into(),
            status: 404,
        })?;
        serde_json::from_value(record).map_err(|err| GatewayError::malformed("/users/get", err))
    }

    async fn list_group_questions(
        &self,
        group_id: &GroupId,
    ) -> Result<QuestionListResponse, GatewayError> {
        self.record(GatewayCall::ListQuestions(group_id.clone())).await;
        if let Some((gated, gate)) = &self.questions_gate {
            if gated == group_id {
                gate.entered.notify_one();
                gate.release.notified().await;
            }
        }
        let script = self.script.lock().await;
        if script.failing_questions.contains(group_id) {
            return Err(unavailable("/groups/questions/view"));
        }
        let (questions, wrapped) = script.questions.get(group_id).cloned().unwrap_or_default();
        Ok(if wrapped {
            QuestionListResponse::Wrapped(QuestionEnvelope { questions })
        } else {
            QuestionListResponse::Bare(questions)
        })
    }

    async fn batch_get_answers(
        &self,
        question_ids: &[QuestionId],
    ) -> Result<BatchAnswersResponse, GatewayError> {
        self.record(GatewayCall::BatchAnswers(question_ids.to_vec()))
            .await;
        let script = self.script.lock().await;
        if script.failing_batches {
            return Err(unavailable("/answers/batch"));
        }
        Ok(question_ids
            .iter()
            .filter_map(|id| script.answers.get(id).map(|list| (id.clone(), list.clone())))
            .collect())
    }

    async fn create_question(&self, request: &CreateQuestionRequest) -> Result<(), GatewayError> {
        self.record(GatewayCall::CreateQuestion(request.clone())).await;
        let mut script = self.script.lock().await;
        if script.fail_create_question {
            return Err(unavailable("/question"));
        }
        script.next_question_id += 1;
        let question = Question {
            question_id: QuestionId::new(format!("q{}", script.next_question_id)),
            group_id: request.group_id.clone(),
            username: request.username.clone(),
            text: request.question.clone(),
            provisional: false,
        };
        script
            .questions
            .entry(request.group_id.clone())
            .or_default()
            .0
            .push(question);
        Ok(())
    }

    async fn create_answer(
        &self,
        request: &CreateAnswerRequest,
    ) -> Result<CreateAnswerAck, GatewayError> {
        self.record(GatewayCall::CreateAnswer(request.clone())).await;
        if let Some(gate) = &self.answer_gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let mut script = self.script.lock().await;
        if script.fail_create_answer {
            return Err(unavailable("/answer"));
        }
        let accuracy = script.accuracy;
        script
            .answers
            .entry(request.question_id.clone())
            .or_default()
            .push(Answer {
                question_id: request.question_id.clone(),
                username: request.username.clone(),
                text: request.answer.clone(),
                accuracy,
            });
        Ok(CreateAnswerAck { accuracy })
    }

    async fn create_group(&self, group_name: &str) -> Result<GroupId, GatewayError> {
        self.record(GatewayCall::CreateGroup(group_name.to_string()))
            .await;
        let mut script = self.script.lock().await;
        if script.fail_create_group {
            return Err(unavailable("/groups/create"));
        }
        script.next_group_id += 1;
        let group_id = GroupId::new(script.next_group_id.to_string());
        script
            .group_names
            .insert(group_id.clone(), group_name.to_string());
        Ok(group_id)
    }

    async fn add_user_to_group(
        &self,
        group_id: &GroupId,
        username: &str,
    ) -> Result<(), GatewayError> {
        self.record(GatewayCall::AddUser(group_id.clone(), username.to_string()))
            .await;
        let mut script = self.script.lock().await;
        if script.fail_add_user {
            return Err(unavailable("/groups/users/create"));
        }
        let name = script
            .group_names
            .get(group_id)
            .cloned()
            .unwrap_or_else(|| "Group".to_string());
        if let Some(Value::Array(groups)) = script
            .users
            .get_mut(username)
            .and_then(|user| user.get_mut("groups"))
        {
            groups.push(Value::String(format!("{name}::{group_id}")));
        }
        Ok(())
    }
}
