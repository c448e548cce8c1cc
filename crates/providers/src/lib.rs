//! LLM Provider implementations for Disha.
//!
//! All providers implement the `disha_core::Provider` trait.
//! `build_from_config` selects one at start-up based on configuration.

pub mod anthropic;
pub mod demo;
pub mod openai_compat;
pub mod router;

pub use anthropic::AnthropicProvider;
pub use demo::DemoProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::build_from_config;

use disha_core::error::ProviderError;
use std::time::Duration;

/// Build the shared HTTP client with a request timeout.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Classify a transport failure.
pub(crate) fn send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

/// Map a non-success HTTP status to a provider error.
///
/// Returns the response untouched on 200; the body is consumed only on failure.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }
    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(format!(
            "Invalid {provider} API key"
        )));
    }
    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        tracing::warn!(provider, status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}
