use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::{Conversation, ConversationId, ConversationSummary, Task, TaskId},
    error::{ApiError, ErrorCode},
    protocol::{
        AddMessageRequest, CreateConversationRequest, CreateTaskRequest, MessageExchange,
        StatusMessage, UpdateTaskRequest,
    },
};
use thiserror::Error;

/// The three ways a gateway call can fail: the request never reached the
/// server, the server answered with a non-success status, or the body did
/// not parse as the expected shape.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server returned status {status}: {error}")]
    Api { status: u16, error: ApiError },
    #[error("failed to decode response body: {0}")]
    Decode(String),
}

/// Request/response port the stores talk through. Concrete transports stay
/// behind this seam so store behavior can be exercised against test doubles.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn health(&self) -> Result<StatusMessage, GatewayError>;
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, GatewayError>;
    async fn create_conversation(&self, title: &str) -> Result<Conversation, GatewayError>;
    async fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, GatewayError>;
    async fn delete_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<StatusMessage, GatewayError>;
    async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<MessageExchange, GatewayError>;
    async fn list_tasks(&self) -> Result<Vec<Task>, GatewayError>;
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, GatewayError>;
    async fn update_task(
        &self,
        task_id: TaskId,
        request: &UpdateTaskRequest,
    ) -> Result<StatusMessage, GatewayError>;
    async fn delete_task(&self, task_id: TaskId) -> Result<StatusMessage, GatewayError>;
}

/// HTTP/JSON gateway against the assistant API.
pub struct HttpBackendGateway {
    http: Client,
    server_url: String,
}

impl HttpBackendGateway {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
        }
    }
}

#[async_trait]
impl BackendGateway for HttpBackendGateway {
    async fn health(&self) -> Result<StatusMessage, GatewayError> {
        let response = self
            .http
            .get(format!("{}/api", self.server_url))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, GatewayError> {
        let response = self
            .http
            .get(format!("{}/api/conversations", self.server_url))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn create_conversation(&self, title: &str) -> Result<Conversation, GatewayError> {
        let response = self
            .http
            .post(format!("{}/api/conversations", self.server_url))
            .json(&CreateConversationRequest {
                title: title.to_string(),
            })
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Conversation, GatewayError> {
        let response = self
            .http
            .get(format!(
                "{}/api/conversations/{conversation_id}",
                self.server_url
            ))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn delete_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<StatusMessage, GatewayError> {
        let response = self
            .http
            .delete(format!(
                "{}/api/conversations/{conversation_id}",
                self.server_url
            ))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn send_message(
        &self,
        conversation_id: ConversationId,
        text: &str,
    ) -> Result<MessageExchange, GatewayError> {
        let response = self
            .http
            .post(format!(
                "{}/api/conversations/{conversation_id}/messages",
                self.server_url
            ))
            .json(&AddMessageRequest {
                message: text.to_string(),
            })
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn list_tasks(&self) -> Result<Vec<Task>, GatewayError> {
        let response = self
            .http
            .get(format!("{}/api/tasks", self.server_url))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn create_task(&self, request: &CreateTaskRequest) -> Result<Task, GatewayError> {
        let response = self
            .http
            .post(format!("{}/api/tasks", self.server_url))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn update_task(
        &self,
        task_id: TaskId,
        request: &UpdateTaskRequest,
    ) -> Result<StatusMessage, GatewayError> {
        let response = self
            .http
            .put(format!("{}/api/tasks/{task_id}", self.server_url))
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    async fn delete_task(&self, task_id: TaskId) -> Result<StatusMessage, GatewayError> {
        let response = self
            .http
            .delete(format!("{}/api/tasks/{task_id}", self.server_url))
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }
}

fn transport(error: reqwest::Error) -> GatewayError {
    GatewayError::Transport(error.to_string())
}

/// Turns a non-success status into `Api`, preferring the server's own error
/// body when it parses; success bodies decode into the expected type.
async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let error = response.json::<ApiError>().await.unwrap_or_else(|_| {
            ApiError::new(ErrorCode::Internal, format!("unexpected status {status}"))
        });
        return Err(GatewayError::Api {
            status: status.as_u16(),
            error,
        });
    }

    response
        .json::<T>()
        .await
        .map_err(|error| GatewayError::Decode(error.to_string()))
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
