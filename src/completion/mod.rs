pub(crate) mod openai;

#[cfg(test)]
pub(crate) mod fake;

use async_trait::async_trait;
use std::time::Duration;

/// Strict JSON schema the reply must conform to.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    pub name: &'static str,
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub schema: ResponseSchema,
    pub temperature: f32,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteCallError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Completion service returned no content")]
    EmptyResponse,

    #[error("Model refused to answer: {0}")]
    Refusal(String),

    #[error("Invalid JSON response: {0}")]
    InvalidJson(String),
}

/// A chat-completion service that answers with a single JSON document
/// matching the requested schema.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<serde_json::Value, RemoteCallError>;
}
