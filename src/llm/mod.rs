//! LLM transport: an OpenAI-compatible chat-completions client.
//!
//! Prompt construction and response parsing for effort ratings live in
//! [`crate::rater`]; this module only owns the trait and the HTTP transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Trait for chat-completion clients, so the rater can be driven against a
/// fake in tests without a network call.
pub trait LlmClient: Send + Sync {
    /// Send a prompt to the model and return the raw completion text plus
    /// whatever usage accounting the provider reported.
    fn complete(&self, prompt: &str) -> Result<LlmCompletion, LlmError>;
}

pub struct LlmCompletion {
    pub text: String,
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Errors from LLM transport.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM client error: {0}")]
    ClientError(String),
    #[error("LLM call timed out after {0}s")]
    Timeout(u64),
    #[error("LLM API returned status {status}: {body}")]
    ApiError { status: u16, body: String },
    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// Calls a configured OpenAI-compatible `chat/completions` endpoint with a
/// blocking client.
pub struct OpenAiChatClient {
    client: reqwest::blocking::Client,
    base_url: String,
    model: String,
}

impl OpenAiChatClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout_sec: u64) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
        }
    }
}

impl LlmClient for OpenAiChatClient {
    fn complete(&self, prompt: &str) -> Result<LlmCompletion, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.client_timeout_secs())
                } else {
                    LlmError::ClientError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::ParseError(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::ParseError("no choices in response".to_string()))?;

        Ok(LlmCompletion {
            text: choice.message.content,
            prompt_tokens: parsed.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: parsed.usage.as_ref().map(|u| u.completion_tokens),
            total_tokens: parsed.usage.as_ref().map(|u| u.total_tokens),
        })
    }
}

impl OpenAiChatClient {
    fn client_timeout_secs(&self) -> u64 {
        self.client
            .timeout()
            .map(|d| d.as_secs())
            .unwrap_or_default()
    }
}
