//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - System prompt as top-level field

use async_trait::async_trait;
use disha_core::error::ProviderError;
use disha_core::message::Role;
use disha_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: "anthropic".into(),
            base_url: ANTHROPIC_BASE_URL.into(),
            api_key: api_key.into(),
            client: crate::http_client(timeout),
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_api_messages(messages: &[ChatMessage]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .map(|m| AnthropicMessage {
                role: match m.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: m.content.clone(),
            })
            .collect()
    }

    fn build_body(request: &CompletionRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });
        if !request.system_prompt.is_empty() {
            body["system"] = serde_json::json!(request.system_prompt);
        }
        body
    }

    /// Concatenate text blocks; other block types are ignored.
    fn parse_response(resp: AnthropicResponse) -> std::result::Result<Completion, ProviderError> {
        let text: Vec<String> = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseContentBlock::Text { text } => Some(text),
                ResponseContentBlock::Other => None,
            })
            .collect();

        if text.is_empty() {
            return Err(ProviderError::MalformedOutput(
                "Anthropic response contained no text blocks".into(),
            ));
        }

        Ok(Completion {
            text: text.join("\n"),
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
            model: resp.model,
        })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(&request);

        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(crate::send_error)?;

        let response = crate::check_status(&self.name, response).await?;

        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedOutput(format!("Failed to parse Anthropic response: {e}"))
        })?;

        Self::parse_response(api_resp)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ResponseContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "claude-3-5-sonnet-20241022".into(),
            system_prompt: "You are Disha".into(),
            messages: vec![ChatMessage::user("Hello"), ChatMessage::assistant("Hi!")],
            max_tokens: 1000,
            temperature: 0.7,
        }
    }

    #[test]
    fn constructor() {
        let provider = AnthropicProvider::new("sk-ant-test", Duration::from_secs(5));
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.base_url, ANTHROPIC_BASE_URL);
    }

    #[test]
    fn constructor_with_base_url() {
        let provider = AnthropicProvider::new("sk-ant-test", Duration::from_secs(5))
            .with_base_url("https://custom.proxy.com/");
        assert_eq!(provider.base_url, "https://custom.proxy.com");
    }

    #[test]
    fn system_prompt_is_top_level() {
        let body = AnthropicProvider::build_body(&request());
        assert_eq!(body["system"], "You are Disha");
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][1]["role"], "assistant");
        assert_eq!(body["max_tokens"], 1000);
    }

    #[test]
    fn empty_system_prompt_omitted() {
        let mut req = request();
        req.system_prompt.clear();
        let body = AnthropicProvider::build_body(&req);
        assert!(body.get("system").is_none());
    }

    #[test]
    fn parse_text_blocks() {
        let resp: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "model": "claude-3-5-sonnet-20241022",
            "content": [
                {"type": "text", "text": "Rest well."},
                {"type": "thinking", "thinking": "hidden"},
                {"type": "text", "text": "Drink fluids."}
            ],
            "usage": {"input_tokens": 20, "output_tokens": 6}
        }))
        .unwrap();
        let completion = AnthropicProvider::parse_response(resp).unwrap();
        assert_eq!(completion.text, "Rest well.\nDrink fluids.");
        assert_eq!(completion.usage.unwrap().total_tokens, 26);
    }

    #[test]
    fn no_text_blocks_is_malformed() {
        let resp: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "model": "m",
            "content": [],
            "usage": {"input_tokens": 1, "output_tokens": 0}
        }))
        .unwrap();
        assert!(matches!(
            AnthropicProvider::parse_response(resp),
            Err(ProviderError::MalformedOutput(_))
        ));
    }
}
