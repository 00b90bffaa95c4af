use async_trait::async_trait;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::config::ReasoningSettings;
use crate::core::prompt::Payload;
use crate::services::reasoning::{BackendError, ReasoningBackend};

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Transient(err.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

/// Reasoning backend speaking the OpenAI-compatible chat completions API
///
/// Sends the payload as a system + user message pair and returns the first
/// choice's content untouched; structural checks happen in the parser.
pub struct ChatCompletionsBackend {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    client: Client,
}

impl ChatCompletionsBackend {
    pub fn new(settings: &ReasoningSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self {
            base_url: settings.endpoint.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ReasoningBackend for ChatCompletionsBackend {
    async fn complete(&self, payload: &Payload) -> Result<String, BackendError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model": &self.model,
            "messages": [
                {"role": "system", "content": &payload.system},
                {"role": "user", "content": &payload.user}
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens
        });

        tracing::debug!("Sending {} byte payload to {}", payload.len(), url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(BackendError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unable to read body".to_string());
            let detail = format!("{}: {}", status, truncate(&body, 200));
            return Err(if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
                BackendError::Transient(detail)
            } else {
                BackendError::Rejected(detail)
            });
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transient(format!("unreadable completion envelope: {}", e)))?;

        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::Transient("completion has no content".to_string()))
    }
}

/// Retry-After in its delta-seconds form; HTTP dates are ignored
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
