//! LLM provider network
//!
//! Wire types, the `Provider` trait implemented by each text-generation
//! backend, and the failover engine that routes around degraded backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use thiserror::Error;

pub mod failover;
pub mod openai;

pub use failover::{CooldownTable, FailoverClient, FailoverPolicy, ProviderSlot, MAX_COOLDOWN};
pub use openai::{OpenAiCompatProvider, MAX_RETRY_AFTER};

/// Provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("malformed response body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("provider rejected request: {0}")]
    Api(String),

    #[error("no API key")]
    NoApiKey,

    #[error("empty or malformed response")]
    InvalidResponse,

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("all LLM providers exhausted after {}s of waiting", .waited.as_secs())]
    AllProvidersExhausted { waited: Duration },

    #[error("no LLM API keys configured; set one of: {0}")]
    NoProvidersConfigured(String),
}

impl ProviderError {
    /// Transport-level failure worth retrying with backoff
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Request(_) | ProviderError::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == "system"
    }

    /// Size in characters, the unit the context budget is measured in
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// Backend response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: Option<String>,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    pub fn empty() -> Self {
        Self {
            content: None,
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    /// Trimmed text, or `None` when the backend produced nothing usable
    pub fn usable_text(&self) -> Option<String> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

/// Token accounting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Request parameters
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// A single text-generation backend
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}

/// Anything that can turn a conversation into text.
///
/// The failover engine is the production implementation; the control loop
/// and document evaluation only depend on this seam.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, messages: &[Message], max_tokens: u32) -> Result<String>;

    /// Pause the caller should take between consecutive calls
    fn call_delay(&self) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_display() {
        assert_eq!(ProviderError::NoApiKey.to_string(), "no API key");
        assert_eq!(
            ProviderError::Api("bad model".to_string()).to_string(),
            "provider rejected request: bad model"
        );
        assert_eq!(
            ProviderError::RateLimited { retry_after: None }.to_string(),
            "rate limited"
        );
        assert_eq!(
            ProviderError::AllProvidersExhausted {
                waited: Duration::from_secs(301)
            }
            .to_string(),
            "all LLM providers exhausted after 301s of waiting"
        );
        assert!(ProviderError::NoProvidersConfigured("GROQ_API_KEY".to_string())
            .to_string()
            .contains("GROQ_API_KEY"));
    }

    #[test]
    fn test_transport_classification() {
        assert!(ProviderError::Connection("refused".to_string()).is_transport());
        assert!(!ProviderError::Api("x".to_string()).is_transport());
        assert!(!ProviderError::InvalidResponse.is_transport());
        assert!(!ProviderError::RateLimited { retry_after: None }.is_transport());
    }

    #[test]
    fn test_message_builders() {
        let msg = Message::system("preamble");
        assert_eq!(msg.role, "system");
        assert!(msg.is_system());

        let msg = Message::user("hi");
        assert_eq!(msg.role, "user");
        assert!(!msg.is_system());

        let msg = Message::assistant(String::from("ok"));
        assert_eq!(msg.role, "assistant");
        assert_eq!(msg.content, "ok");
    }

    #[test]
    fn test_message_char_len_counts_chars() {
        assert_eq!(Message::user("≥70%").char_len(), 4);
    }

    #[test]
    fn test_usable_text() {
        assert_eq!(
            ChatResponse::text("  hello \n").usable_text(),
            Some("hello".to_string())
        );
        assert_eq!(ChatResponse::text("   ").usable_text(), None);
        assert_eq!(ChatResponse::empty().usable_text(), None);
    }
}
