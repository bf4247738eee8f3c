use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CompletionClient, CompletionRequest, RemoteCallError, ResponseSchema};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchema<'a>,
}

#[derive(Serialize)]
struct JsonSchema<'a> {
    name: &'static str,
    strict: bool,
    schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
    refusal: Option<String>,
}

pub struct OpenAiClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        endpoint: String,
        model: String,
        api_key: String,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            model,
            api_key,
            timeout,
        })
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> ChatRequest<'a> {
        let ResponseSchema { name, schema } = &request.schema;

        ChatRequest {
            model: &self.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &request.system_prompt,
                },
                Message {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            temperature: request.temperature,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchema {
                    name: *name,
                    strict: true,
                    schema,
                },
            },
        }
    }

    fn transport_error(&self, error: reqwest::Error) -> RemoteCallError {
        if error.is_timeout() {
            RemoteCallError::Timeout(self.timeout)
        } else {
            RemoteCallError::Http(error.to_string())
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<serde_json::Value, RemoteCallError> {
        tracing::debug!(schema = request.schema.name, model = %self.model, "Requesting completion");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.body(&request))
            .send()
            .await
            .map_err(|error| self.transport_error(error))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| self.transport_error(error))?;

        reply_content(status, &body)
    }
}

/// Maps a finished HTTP exchange to the JSON document the model produced.
fn reply_content(status: StatusCode, body: &str) -> Result<serde_json::Value, RemoteCallError> {
    if !status.is_success() {
        return Err(RemoteCallError::Status {
            status: status.as_u16(),
            body: body.to_owned(),
        });
    }

    let chat_response: ChatResponse = serde_json::from_str(body)
        .map_err(|error| RemoteCallError::InvalidJson(error.to_string()))?;

    let reply = chat_response
        .choices
        .into_iter()
        .next()
        .ok_or(RemoteCallError::EmptyResponse)?
        .message;

    if let Some(refusal) = reply.refusal {
        return Err(RemoteCallError::Refusal(refusal));
    }

    parse_content(reply.content.as_deref().unwrap_or_default())
}

fn parse_content(content: &str) -> Result<serde_json::Value, RemoteCallError> {
    let content = content.trim();
    let json_text = content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .unwrap_or(content)
        .trim_end_matches("```")
        .trim();

    if json_text.is_empty() {
        return Err(RemoteCallError::EmptyResponse);
    }

    serde_json::from_str(json_text).map_err(|error| {
        RemoteCallError::InvalidJson(format!("{error} in `{json_text}`"))
    })
}
