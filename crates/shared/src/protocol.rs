use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Answer, GroupId, Question, QuestionId};

pub const GET_USER_PATH: &str = "/users/get";
pub const LIST_GROUP_QUESTIONS_PATH: &str = "/groups/questions/view";
pub const BATCH_ANSWERS_PATH: &str = "/answers/batch";
pub const CREATE_QUESTION_PATH: &str = "/question";
pub const CREATE_ANSWER_PATH: &str = "/answer";
pub const CREATE_GROUP_PATH: &str = "/groups/create";
pub const ADD_USER_TO_GROUP_PATH: &str = "/groups/users/create";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetUserRequest {
    pub username: String,
}

/// User record exactly as the server returns it. `groups` is kept untyped so
/// membership resolution can cope with missing or malformed lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub middle_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub groups: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuestionsRequest {
    pub group_id: GroupId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuestionEnvelope {
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// The two encodings servers use for a group's question list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuestionListResponse {
    Bare(Vec<Question>),
    Wrapped(QuestionEnvelope),
}

impl QuestionListResponse {
    pub fn into_questions(self) -> Vec<Question> {
        match self {
            Self::Bare(questions) => questions,
            Self::Wrapped(envelope) => envelope.questions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAnswersRequest {
    pub question_ids: Vec<QuestionId>,
}

pub type BatchAnswersResponse = HashMap<QuestionId, Vec<Answer>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    pub username: String,
    pub group_id: GroupId,
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAnswerRequest {
    pub username: String,
    pub question_id: QuestionId,
    pub answer: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateAnswerAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

impl CreateAnswerAck {
    /// Acks are free-form; only a numeric `accuracy` field is picked out.
    pub fn from_body(body: &str) -> Self {
        let accuracy = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|value| value.get("accuracy").and_then(Value::as_f64));
        Self { accuracy }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub group_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupResponse {
    #[serde(alias = "id")]
    pub group_id: GroupId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddUserToGroupRequest {
    pub group_id: GroupId,
    pub username: String,
}
