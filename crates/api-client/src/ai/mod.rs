use crate::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_TEMPERATURE: f64 = 0.5;
const DEFAULT_MAX_TOKENS: u32 = 2000;

/// Substring markers (case-sensitive) that make a transport/provider failure
/// worth retrying rather than surfacing immediately. HTTP status failures
/// are not in this list and are never retried.
const RETRYABLE_MARKERS: &[&str] = &[
    "EOF",
    "timeout",
    "connection reset",
    "connection refused",
    "temporary failure",
    "no such host",
    "stream error",
    "INTERNAL_ERROR",
];

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    pub stream: bool,
}

impl ChatRequest {
    pub fn simple(model: impl Into<String>, system_prompt: &str, user_prompt: &str) -> Self {
        Self {
            model: model.into(),
            messages: vec![
                ChatMessage { role: "system".into(), content: system_prompt.to_string() },
                ChatMessage { role: "user".into(), content: user_prompt.to_string() },
            ],
            temperature: Some(DEFAULT_TEMPERATURE),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            top_p: None,
            stop: None,
            tools: None,
            tool_choice: None,
            stream: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// One provider connection: a base URL plus a bearer key. Instances are
/// created per trader, same as [`crate::adapter::ExchangeAdapter`]
/// instances, since each trader may point at a different model/provider.
pub struct AiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AiClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn endpoint(&self) -> String {
        if let Some(exact) = self.base_url.strip_suffix('#') {
            exact.to_string()
        } else {
            format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
        }
    }

    /// Simple form: a single system/user prompt pair, returns the model's
    /// text reply.
    pub async fn call(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let mut request = ChatRequest::simple(self.model.clone(), system_prompt, user_prompt);
        request.max_tokens = Some(self.max_tokens);
        self.call_with_request(request).await
    }

    /// Full form: caller controls the entire request shape.
    pub async fn call_with_request(&self, request: ChatRequest) -> Result<String> {
        let endpoint = self.endpoint();
        let mut attempt = 1;
        loop {
            match self.send(&endpoint, &request).await {
                Ok(text) => return Ok(text),
                Err(err) if attempt < MAX_ATTEMPTS && is_retryable(&err) => {
                    tracing::warn!(error = %err, attempt, "retrying AI call");
                    tokio::time::sleep(BASE_DELAY * attempt).await;
                    attempt += 1;
                }
                Err(err) => return Err(Error::AiCallFailed(err.to_string())),
            }
        }
    }

    async fn send(&self, endpoint: &str, request: &ChatRequest) -> Result<String> {
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(Error::Rejected(format!("AI provider returned {status}: {text}")));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(Error::AiEmptyResponse)
    }
}

fn is_retryable(err: &Error) -> bool {
    let text = err.to_string();
    RETRYABLE_MARKERS.iter().any(|marker| text.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_appends_chat_completions_by_default() {
        let client = AiClient::new("https://api.example.com/v1", "key", "gpt");
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }

    #[test]
    fn endpoint_sentinel_uses_exact_url() {
        let client = AiClient::new("https://api.example.com/v1/custom#", "key", "gpt");
        assert_eq!(client.endpoint(), "https://api.example.com/v1/custom");
    }

    #[test]
    fn retryable_marker_matches_substring() {
        let err = Error::Transient("connection reset by peer".into());
        assert!(is_retryable(&err));
    }

    #[test]
    fn non_retryable_status_is_not_retried() {
        let err = Error::Rejected("AI provider returned 401 Unauthorized".into());
        assert!(!is_retryable(&err));
    }
}
