//! Shared test helpers for coach tests.

use disha_core::error::ProviderError;
use disha_core::provider::{Completion, CompletionRequest, Provider, Usage};
use std::sync::Mutex;
use std::time::Duration;

/// A mock provider that returns a sequence of scripted results and records
/// every request it receives.
///
/// Once the script runs out every call fails with an API error.
pub struct ScriptedProvider {
    responses: Mutex<Vec<Result<Completion, ProviderError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Result<Completion, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// A provider answering each call with the next text.
    pub fn replies(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_completion(t))).collect())
    }

    /// Sleep before answering every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let next = {
            let call = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request);
                requests.len()
            };
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(ProviderError::ApiError {
                    status_code: 500,
                    message: format!("ScriptedProvider: no response for call #{call}"),
                })
            } else {
                responses.remove(0)
            }
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        next
    }
}

/// A plain completion with fixed usage numbers.
pub fn make_completion(text: &str) -> Completion {
    Completion {
        text: text.to_string(),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "scripted-model".into(),
    }
}
