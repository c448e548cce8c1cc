//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI itself and any endpoint exposing the
//! `/chat/completions` API (OpenRouter, vLLM, Ollama, ...).
//! The system prompt travels as the first `system` message.

use async_trait::async_trait;
use disha_core::error::ProviderError;
use disha_core::message::Role;
use disha_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: crate::http_client(timeout),
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self::new("openai", OPENAI_BASE_URL, api_key, timeout)
    }

    /// Prepend the system prompt and convert history to API format.
    fn to_api_messages(system_prompt: &str, messages: &[ChatMessage]) -> Vec<ApiMessage> {
        let mut result = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.is_empty() {
            result.push(ApiMessage {
                role: "system".into(),
                content: system_prompt.to_string(),
            });
        }
        result.extend(messages.iter().map(|m| ApiMessage {
            role: match m.role {
                Role::User => "user".into(),
                Role::Assistant => "assistant".into(),
            },
            content: m.content.clone(),
        }));
        result
    }

    fn parse_response(resp: ApiResponse) -> std::result::Result<Completion, ProviderError> {
        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::MalformedOutput("No choices in response".into()))?;

        let text = choice
            .message
            .content
            .ok_or_else(|| ProviderError::MalformedOutput("Choice has no content".into()))?;

        Ok(Completion {
            text,
            usage: resp.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            model: resp.model,
        })
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.system_prompt, &request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(crate::send_error)?;

        let response = crate::check_status(&self.name, response).await?;

        let api_resp: ApiResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedOutput(format!("Failed to parse response: {e}"))
        })?;

        Self::parse_response(api_resp)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(crate::send_error)?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".into(),
            system_prompt: "You are Disha".into(),
            messages: vec![ChatMessage::user("hello")],
            max_tokens: 64,
            temperature: 0.7,
        }
    }

    /// Serve `router` on an ephemeral port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn openai_constructor() {
        let provider = OpenAiCompatProvider::openai("sk-test", Duration::from_secs(5));
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.base_url, OPENAI_BASE_URL);
    }

    #[test]
    fn trailing_slash_trimmed() {
        let provider =
            OpenAiCompatProvider::new("proxy", "http://localhost:8080/v1/", "", Duration::from_secs(5));
        assert_eq!(provider.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn system_prompt_goes_first() {
        let msgs = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let api = OpenAiCompatProvider::to_api_messages("persona", &msgs);
        assert_eq!(api.len(), 3);
        assert_eq!(api[0].role, "system");
        assert_eq!(api[0].content, "persona");
        assert_eq!(api[1].role, "user");
        assert_eq!(api[2].role, "assistant");
    }

    #[test]
    fn parse_response_with_usage() {
        let resp: ApiResponse = serde_json::from_value(serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "Stay hydrated."}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 3, "total_tokens": 13}
        }))
        .unwrap();
        let completion = OpenAiCompatProvider::parse_response(resp).unwrap();
        assert_eq!(completion.text, "Stay hydrated.");
        assert_eq!(completion.usage.unwrap().total_tokens, 13);
    }

    #[test]
    fn parse_response_without_choices_is_malformed() {
        let resp: ApiResponse =
            serde_json::from_value(serde_json::json!({"model": "x", "choices": []})).unwrap();
        let err = OpenAiCompatProvider::parse_response(resp).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedOutput(_)));
    }

    #[tokio::test]
    async fn completes_against_local_server() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["messages"][0]["role"], "system");
                Json(serde_json::json!({
                    "model": "gpt-4o-mini",
                    "choices": [{"message": {"content": "Drink water."}}]
                }))
            }),
        );
        let base = serve(router).await;
        let provider = OpenAiCompatProvider::new("openai", base, "sk", Duration::from_secs(5));
        let completion = provider.complete(request()).await.unwrap();
        assert_eq!(completion.text, "Drink water.");
    }

    #[tokio::test]
    async fn rate_limit_status_is_mapped() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "12")], "slow down") }),
        );
        let base = serve(router).await;
        let provider = OpenAiCompatProvider::new("openai", base, "sk", Duration::from_secs(5));
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 12 }));
    }

    #[tokio::test]
    async fn unauthorized_status_is_mapped() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = serve(router).await;
        let provider = OpenAiCompatProvider::new("openai", base, "bad", Duration::from_secs(5));
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        );
        let base = serve(router).await;
        let provider = OpenAiCompatProvider::new("openai", base, "sk", Duration::from_millis(100));
        let err = provider.complete(request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }
}
