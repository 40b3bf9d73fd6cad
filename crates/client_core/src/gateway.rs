use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{GroupId, QuestionId},
    error::GatewayError,
    protocol::{
        AddUserToGroupRequest, BatchAnswersRequest, BatchAnswersResponse, CreateAnswerAck,
        CreateAnswerRequest, CreateGroupRequest, CreateGroupResponse, CreateQuestionRequest,
        GetUserRequest, ListQuestionsRequest, QuestionListResponse, UserRecord,
        ADD_USER_TO_GROUP_PATH, BATCH_ANSWERS_PATH, CREATE_ANSWER_PATH, CREATE_GROUP_PATH,
        CREATE_QUESTION_PATH, GET_USER_PATH, LIST_GROUP_QUESTIONS_PATH,
    },
};
use tracing::debug;
use url::Url;

use crate::config::ClientSettings;

/// Request/response exchange with the board server, one method per remote operation.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn get_user(&self, username: &str) -> Result<UserRecord, GatewayError>;
    async fn list_group_questions(
        &self,
        group_id: &GroupId,
    ) -> Result<QuestionListResponse, GatewayError>;
    async fn batch_get_answers(
        &self,
        question_ids: &[QuestionId],
    ) -> Result<BatchAnswersResponse, GatewayError>;
    async fn create_question(&self, request: &CreateQuestionRequest) -> Result<(), GatewayError>;
    async fn create_answer(
        &self,
        request: &CreateAnswerRequest,
    ) -> Result<CreateAnswerAck, GatewayError>;
    async fn create_group(&self, group_name: &str) -> Result<GroupId, GatewayError>;
    async fn add_user_to_group(&self, group_id: &GroupId, username: &str)
        -> Result<(), GatewayError>;
}

pub struct HttpGateway {
    http: Client,
    base_url: Url,
}

impl HttpGateway {
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self> {
        let mut base_url =
            Url::parse(server_url).with_context(|| format!("invalid server url: {server_url}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self { http, base_url })
    }

    pub fn from_settings(settings: &ClientSettings) -> Result<Self> {
        let server_url = settings.validated_server_url()?;
        Self::new(server_url.as_str(), settings.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| GatewayError::transport(path, err))
    }

    async fn post_text<B>(&self, path: &str, body: &B) -> Result<String, GatewayError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let url = self.endpoint(path)?;
        debug!(endpoint = path, "gateway: request");
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| GatewayError::transport(path, err))?
            .error_for_status()
            .map_err(|err| match err.status() {
                Some(status) => GatewayError::Status {
                    endpoint: path.to_string(),
                    status: status.as_u16(),
                },
                None => GatewayError::transport(path, err),
            })?;
        response
            .text()
            .await
            .map_err(|err| GatewayError::transport(path, err))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, GatewayError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let text = self.post_text(path, body).await?;
        serde_json::from_str(&text).map_err(|err| GatewayError::malformed(path, err))
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn get_user(&self, username: &str) -> Result<UserRecord, GatewayError> {
        self.post_json(
            GET_USER_PATH,
            &GetUserRequest {
                username: username.to_string(),
            },
        )
        .await
    }

    async fn list_group_questions(
        &self,
        group_id: &GroupId,
    ) -> Result<QuestionListResponse, GatewayError> {
        self.post_json(
            LIST_GROUP_QUESTIONS_PATH,
            &ListQuestionsRequest {
                group_id: group_id.clone(),
            },
        )
        .await
    }

    async fn batch_get_answers(
        &self,
        question_ids: &[QuestionId],
    ) -> Result<BatchAnswersResponse, GatewayError> {
        self.post_json(
            BATCH_ANSWERS_PATH,
            &BatchAnswersRequest {
                question_ids: question_ids.to_vec(),
            },
        )
        .await
    }

    async fn create_question(&self, request: &CreateQuestionRequest) -> Result<(), GatewayError> {
        self.post_text(CREATE_QUESTION_PATH, request).await?;
        Ok(())
    }

    async fn create_answer(
        &self,
        request: &CreateAnswerRequest,
    ) -> Result<CreateAnswerAck, GatewayError> {
        let body = self.post_text(CREATE_ANSWER_PATH, request).await?;
        Ok(CreateAnswerAck::from_body(&body))
    }

    async fn create_group(&self, group_name: &str) -> Result<GroupId, GatewayError> {
        let response: CreateGroupResponse = self
            .post_json(
                CREATE_GROUP_PATH,
                &CreateGroupRequest {
                    group_name: group_name.to_string(),
                },
            )
            .await?;
        if response.group_id.is_empty() {
            return Err(GatewayError::malformed(
                CREATE_GROUP_PATH,
                "server returned an empty group id",
            ));
        }
        Ok(response.group_id)
    }

    async fn add_user_to_group(
        &self,
        group_id: &GroupId,
        username: &str,
    ) -> Result<(), GatewayError> {
        self.post_text(
            ADD_USER_TO_GROUP_PATH,
            &AddUserToGroupRequest {
                group_id: group_id.clone(),
                username: username.to_string(),
            },
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
