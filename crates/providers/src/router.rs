//! Provider selection — builds the configured LLM backend once at start-up.

use crate::anthropic::{ANTHROPIC_BASE_URL, AnthropicProvider};
use crate::demo::DemoProvider;
use crate::openai_compat::{OPENAI_BASE_URL, OpenAiCompatProvider};
use disha_config::{AppConfig, ProviderKind};
use disha_core::error::ProviderError;
use disha_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

/// Build the provider named by `config.provider.kind`.
///
/// Networked providers require an API key; the demo provider never does.
pub fn build_from_config(config: &AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let settings = &config.provider;
    let timeout = Duration::from_secs(settings.timeout_secs);

    let require_key = || {
        settings.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(format!(
                "no API key for provider '{}' (set DISHA_API_KEY or the vendor variable)",
                settings.kind
            ))
        })
    };

    let base_url = settings
        .api_url
        .clone()
        .unwrap_or_else(|| default_base_url(settings.kind).to_string());

    let provider: Arc<dyn Provider> = match settings.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiCompatProvider::new(
            "openai",
            base_url,
            require_key()?,
            timeout,
        )),
        ProviderKind::Anthropic => {
            Arc::new(AnthropicProvider::new(require_key()?, timeout).with_base_url(base_url))
        }
        ProviderKind::Demo => {
            tracing::warn!("Running in demo mode: replies are canned, no LLM is called");
            Arc::new(DemoProvider::new())
        }
    };

    tracing::info!(provider = provider.name(), model = %settings.model_name(), "Provider ready");
    Ok(provider)
}

/// Get the default base URL for each provider kind.
fn default_base_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => OPENAI_BASE_URL,
        ProviderKind::Anthropic => ANTHROPIC_BASE_URL,
        ProviderKind::Demo => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_needs_no_key() {
        let provider = build_from_config(&AppConfig::default()).unwrap();
        assert_eq!(provider.name(), "demo");
    }

    #[test]
    fn openai_without_key_is_not_configured() {
        let mut config = AppConfig::default();
        config.provider.kind = ProviderKind::OpenAi;
        let err = build_from_config(&config).err().unwrap();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn anthropic_with_key_builds() {
        let mut config = AppConfig::default();
        config.provider.kind = ProviderKind::Anthropic;
        config.provider.api_key = Some("sk-ant".into());
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
    }

    #[test]
    fn default_urls() {
        assert_eq!(default_base_url(ProviderKind::OpenAi), "https://api.openai.com/v1");
        assert_eq!(default_base_url(ProviderKind::Anthropic), "https://api.anthropic.com");
    }
}
