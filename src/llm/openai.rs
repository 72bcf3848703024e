//! OpenAI-compatible Chat Completions client.

use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ChatMessage, CompletionRequest, CompletionResponse, LlmClient, ToolCall};
use crate::config::LlmConfig;
use crate::{AppError, Result};

/// Retries for transient failures.
const MAX_RETRIES: u32 = 3;

const INITIAL_BACKOFF_MS: u64 = 1000;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// HTTP client for `{base_url}/chat/completions`.
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: String,
    max_tokens: u32,
}

impl OpenAiClient {
    /// Build a client from the `[llm]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Llm` if the HTTP client cannot be constructed.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| AppError::Llm(format!("failed to build http client: {err}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn build_body(&self, request: &CompletionRequest) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(request.messages.iter().map(convert_message));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
        });

        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.parameters,
                        }
                    })
                })
                .collect();
            body["tool_choice"] = json!("auto");
        }

        body
    }
}

fn convert_message(message: &ChatMessage) -> Value {
    match message {
        ChatMessage::User(text) => json!({ "role": "user", "content": text }),
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            let mut value = json!({ "role": "assistant", "content": content });
            if !tool_calls.is_empty() {
                value["tool_calls"] = tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.name, "arguments": call.arguments },
                        })
                    })
                    .collect();
            }
            value
        }
        ChatMessage::Tool {
            tool_call_id,
            content,
        } => json!({ "role": "tool", "tool_call_id": tool_call_id, "content": content }),
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

fn parse_response(response: ApiResponse) -> Result<CompletionResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Llm("response contained no choices".into()))?;

    Ok(CompletionResponse {
        content: choice.message.content,
        tool_calls: choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect(),
    })
}

impl LlmClient for OpenAiClient {
    fn complete<'a>(&'a self, request: &'a CompletionRequest) -> BoxFuture<'a, Result<CompletionResponse>> {
        Box::pin(async move {
            let url = format!("{}/chat/completions", self.base_url);
            let body = self.build_body(request);
            debug!(model = %self.model, tools = request.tools.len(), "llm completion request");

            let mut last_error = None;
            for attempt in 0..=MAX_RETRIES {
                if attempt > 0 {
                    let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                    warn!(attempt, backoff_ms = backoff, "retrying llm request after transient error");
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }

                let response = match self
                    .http
                    .post(&url)
                    .bearer_auth(&self.api_key)
                    .json(&body)
                    .send()
                    .await
                {
                    Ok(response) => response,
                    Err(err) => {
                        last_error = Some(AppError::Llm(format!("request failed: {err}")));
                        continue;
                    }
                };

                let status = response.status();
                if is_retryable_status(status.as_u16()) && attempt < MAX_RETRIES {
                    let text = response.text().await.unwrap_or_default();
                    last_error = Some(AppError::Llm(format!("api error {status}: {text}")));
                    continue;
                }

                if !status.is_success() {
                    let text = response.text().await.unwrap_or_default();
                    return Err(AppError::Llm(format!("api error {status}: {text}")));
                }

                let parsed: ApiResponse = response
                    .json()
                    .await
                    .map_err(|err| AppError::Llm(format!("malformed response: {err}")))?;
                return parse_response(parsed);
            }

            Err(last_error.unwrap_or_else(|| AppError::Llm("max retries exceeded".into())))
        })
    }
}
