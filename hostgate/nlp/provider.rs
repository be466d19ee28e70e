use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

/// System and user messages sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Fixed instruction describing the expected reply.
    pub system: String,
    /// Per-request content.
    pub user: String,
}

impl Prompt {
    /// Creates a prompt.
    #[must_use]
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Failures of a remote completion call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// The call exceeded its deadline.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),
    /// The provider asked us to slow down.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited {
        /// Server-suggested delay, when given.
        retry_after_secs: Option<u64>,
    },
    /// Non-success HTTP status other than auth and rate limiting.
    #[error("provider returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        body: String,
    },
    /// Credentials rejected.
    #[error("provider rejected credentials: {0}")]
    Unauthorized(String),
    /// Reply did not have the expected shape.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
    /// No provider available.
    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether retrying the same call could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Unauthorized(_) | Self::InvalidResponse(_) | Self::NotConfigured(_) => false,
        }
    }
}

/// Remote natural-language service that completes prompts.
#[async_trait]
pub trait InterpretationProvider: Send + Sync {
    /// Provider name for diagnostics.
    fn name(&self) -> &str;

    /// Returns the raw reply text for `prompt`.
    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}

/// Connection settings for [`ChatCompletionsProvider`].
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model identifier.
    pub model: String,
    /// Bearer token; local servers may not need one.
    pub api_key: Option<String>,
    /// Per-call deadline.
    pub timeout: Duration,
    /// Reply token cap.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            max_tokens: 500,
            temperature: 0.1,
        }
    }
}

/// Provider speaking the OpenAI-compatible chat-completions protocol.
pub struct ChatCompletionsProvider {
    client: Client,
    settings: ProviderSettings,
}

impl ChatCompletionsProvider {
    /// Builds the HTTP client.
    pub fn new(settings: ProviderSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent(concat!("hostgate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| ProviderError::NotConfigured(err.to_string()))?;
        Ok(Self { client, settings })
    }

    /// Effective settings.
    #[must_use]
    pub const fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    fn map_send_error(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.settings.timeout)
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl InterpretationProvider for ChatCompletionsProvider {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let body = json!({
            "model": self.settings.model,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
            "max_tokens": self.settings.max_tokens,
            "temperature": self.settings.temperature,
        });

        let mut request = self
            .client
            .post(self.endpoint())
            .timeout(self.settings.timeout)
            .json(&body);
        if let Some(key) = &self.settings.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|err| self.map_send_error(&err))?;
        let status = response.status();
        if !status.is_success() {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text, retry_after_secs));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| ProviderError::InvalidResponse(err.to_string()))?;
        debug!(model = %self.settings.model, "provider reply received");
        reply_content(&payload)
    }
}

fn status_error(status: StatusCode, body: String, retry_after_secs: Option<u64>) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::Unauthorized(body),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after_secs },
        _ => ProviderError::Status {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        },
    }
}

/// Pulls `choices[0].message.content` out of a chat-completions payload.
pub fn reply_content(payload: &Value) -> Result<String, ProviderError> {
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::InvalidResponse("missing choices[0].message.content".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ProviderError::Transport("reset".into()).is_transient());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ProviderError::RateLimited { retry_after_secs: None }.is_transient());
        assert!(ProviderError::Status { status: 503, body: String::new() }.is_transient());
        assert!(!ProviderError::Status { status: 400, body: String::new() }.is_transient());
        assert!(!ProviderError::Unauthorized("bad key".into()).is_transient());
        assert!(!ProviderError::NotConfigured("none".into()).is_transient());
    }

    #[test]
    fn status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "no".into(), None),
            ProviderError::Unauthorized(_)
        ));
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, String::new(), Some(7)),
            ProviderError::RateLimited { retry_after_secs: Some(7) }
        );
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, "upstream".into(), None),
            ProviderError::Status { status: 502, .. }
        ));
    }

    #[test]
    fn extracts_reply_content() {
        let payload = json!({"choices": [{"message": {"role": "assistant", "content": "{\"intent\":\"system_info\"}"}}]});
        assert_eq!(reply_content(&payload).unwrap(), "{\"intent\":\"system_info\"}");
        assert!(matches!(
            reply_content(&json!({"choices": []})),
            Err(ProviderError::InvalidResponse(_))
        ));
    }

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let provider = ChatCompletionsProvider::new(ProviderSettings {
            base_url: "http://localhost:8080/v1/".into(),
            ..ProviderSettings::default()
        })
        .unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:8080/v1/chat/completions");
    }
}
