//! Provider trait — the abstraction over LLM backends.
//!
//! A Provider takes a system prompt plus a bounded chat history and returns
//! a single completion. The coach performs exactly one call per turn, so
//! there is no streaming or tool-calling surface here.
//!
//! Implementations: OpenAI, Anthropic, Demo (offline canned replies).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Role;

/// One turn of chat history as sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// Persona, profile, memories, protocols and guidelines
    pub system_prompt: String,

    /// History in chronological order, ending with the current user turn
    pub messages: Vec<ChatMessage>,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The provider's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,

    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// The core Provider trait.
///
/// The chat service calls `complete()` without knowing which backend is
/// configured. The backend is chosen once at start-up.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name (e.g., "openai", "anthropic", "demo").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_request_default_temperature() {
        let req: CompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o-mini",
            "system_prompt": "be kind",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 100
        }))
        .unwrap();
        assert!((req.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(req.messages[0], ChatMessage::user("hi"));
    }
}
