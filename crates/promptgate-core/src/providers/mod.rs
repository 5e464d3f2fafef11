//! Provider adapters
//!
//! Each adapter normalizes a canonical chat request against one LLM wire
//! format and folds the provider's response back into the uniform
//! [`ChatResponse`] shape. Adapters speak HTTP directly; there are no vendor
//! SDKs involved. Failures are classified by [`error::ProviderError`] so the
//! fallback executor can tell retryable from terminal.

mod anthropic;
mod error;
mod google;
mod openai;
mod wire;

pub use anthropic::AnthropicAdapter;
pub use error::{ProviderError, ProviderErrorReason};
pub use google::GoogleAdapter;
pub use openai::OpenAiAdapter;

use crate::config::{MessageRole, ResponseFormat};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One message of a conversation, in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Canonical request handed to an adapter. `params` is already in
/// provider-native form (see [`crate::params::map_parameters`]).
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub user_id: Option<String>,
    pub response_format: ResponseFormat,
    /// Resolved schema fragment when `response_format` is `json_schema`.
    pub response_schema: Option<Value>,
    pub params: Map<String, Value>,
}

/// Normalized chat-completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl ChatResponse {
    /// Content of the first choice, the overwhelmingly common access path.
    pub fn content_text(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// The capability every provider adapter exposes.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn chat_completion(
        &self,
        options: ChatOptions,
    ) -> Result<ChatResponse, ProviderError>;
}

/// Split canonical messages into a folded system prefix and the remaining
/// conversation. System messages are joined with a double newline, the way
/// providers without multi-system support expect them.
pub(crate) fn fold_system(messages: &[ChatMessage]) -> (Option<String>, Vec<&ChatMessage>) {
    let mut system_parts = Vec::new();
    let mut rest = Vec::new();
    for message in messages {
        if message.role == MessageRole::System {
            system_parts.push(message.content.as_str());
        } else {
            rest.push(message);
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, rest)
}
