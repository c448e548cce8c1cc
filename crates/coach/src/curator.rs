//! Memory curator: periodic extraction of durable facts and top-K recall.
//!
//! Every `extraction_interval` messages the recent dialogue window is sent to
//! the provider with an extraction prompt. The reply is expected to be a JSON
//! array of `{category, key, value, importance}` records which are upserted
//! on `(user, category, key)`. Every failure on this path is logged and
//! swallowed; chat never depends on extraction succeeding.

use std::sync::Arc;
use std::time::Duration;

use disha_config::MemoryConfig;
use disha_core::error::{ProviderError, StoreError};
use disha_core::memory::{Importance, MemoryCategory, MemoryRecord, MemoryStore, NewMemory};
use disha_core::message::ConversationStore;
use disha_core::provider::{ChatMessage, CompletionRequest, Provider};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::prompts;

/// Sampling temperature for extraction calls.
pub const EXTRACTION_TEMPERATURE: f32 = 0.3;

/// Reply allowance for extraction calls.
pub const EXTRACTION_MAX_TOKENS: u32 = 500;

/// True when going from `before` to `after` messages crosses a multiple of
/// `interval`.
pub fn crosses_watermark(interval: usize, before: usize, after: usize) -> bool {
    interval > 0 && after / interval > before / interval
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Extraction call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Extraction output is not a JSON array: {0}")]
    Malformed(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one extraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub stored: usize,
    pub skipped: usize,
}

/// Records parsed out of one extraction reply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedExtraction {
    pub memories: Vec<NewMemory>,
    pub skipped: usize,
}

#[derive(Deserialize)]
struct RawMemory {
    category: Option<String>,
    key: Option<String>,
    value: Option<Value>,
    importance: Option<Value>,
}

impl RawMemory {
    fn into_memory(self) -> Option<NewMemory> {
        let category: MemoryCategory = self.category?.parse().ok()?;
        let key = self.key?.trim().to_string();
        let value = match self.value? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        if key.is_empty() || value.is_empty() {
            return None;
        }
        let importance = match self.importance {
            None | Some(Value::Null) => Importance::default(),
            Some(Value::Number(n)) => Importance::clamped(n.as_f64()?.round() as i64),
            Some(Value::String(s)) => Importance::clamped(s.trim().parse().ok()?),
            Some(_) => return None,
        };
        Some(NewMemory {
            category,
            key,
            value,
            importance,
        })
    }
}

/// Remove a surrounding Markdown code fence, with or without a language tag.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest.trim_start_matches("json"),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Parse an extraction reply into memories.
///
/// Falls back to the outermost `[...]` slice when the model wraps the array
/// in prose. Anything other than an array is malformed.
pub fn parse_extraction(text: &str) -> Result<ParsedExtraction, ExtractionError> {
    let body = strip_code_fence(text);
    let parsed = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(err) => {
            let slice = match (body.find('['), body.rfind(']')) {
                (Some(start), Some(end)) if start < end => &body[start..=end],
                _ => return Err(ExtractionError::Malformed(err.to_string())),
            };
            serde_json::from_str(slice).map_err(|e| ExtractionError::Malformed(e.to_string()))?
        }
    };

    let Value::Array(items) = parsed else {
        return Err(ExtractionError::Malformed("expected an array".into()));
    };

    let mut out = ParsedExtraction::default();
    for item in items {
        match serde_json::from_value::<RawMemory>(item)
            .ok()
            .and_then(RawMemory::into_memory)
        {
            Some(memory) => out.memories.push(memory),
            None => out.skipped += 1,
        }
    }
    Ok(out)
}

/// Extracts memories from dialogue and recalls the most important ones.
#[derive(Clone)]
pub struct MemoryCurator {
    provider: Arc<dyn Provider>,
    conversations: Arc<dyn ConversationStore>,
    memories: Arc<dyn MemoryStore>,
    model: String,
    config: MemoryConfig,
    timeout: Duration,
}

impl MemoryCurator {
    pub fn new(
        provider: Arc<dyn Provider>,
        conversations: Arc<dyn ConversationStore>,
        memories: Arc<dyn MemoryStore>,
        model: impl Into<String>,
        config: MemoryConfig,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            conversations,
            memories,
            model: model.into(),
            config,
            timeout,
        }
    }

    /// Whether a turn taking the log from `before` to `after` messages is due
    /// for extraction.
    pub fn is_due(&self, before: usize, after: usize) -> bool {
        crosses_watermark(self.config.extraction_interval, before, after)
    }

    /// Memories eligible for prompt injection.
    pub async fn recall(&self, user_id: i64) -> Result<Vec<MemoryRecord>, StoreError> {
        let min = Importance::clamped(self.config.min_importance as i64);
        self.memories.top_k(user_id, self.config.top_k, min).await
    }

    /// Run one extraction pass, logging and swallowing any failure.
    pub async fn extract(&self, user_id: i64) -> ExtractionReport {
        match self.try_extract(user_id).await {
            Ok(report) => {
                info!(
                    user_id,
                    stored = report.stored,
                    skipped = report.skipped,
                    "Memories extracted"
                );
                report
            }
            Err(e) => {
                warn!(user_id, error = %e, "Memory extraction dropped");
                ExtractionReport::default()
            }
        }
    }

    /// One extraction pass over the latest dialogue window.
    pub async fn try_extract(&self, user_id: i64) -> Result<ExtractionReport, ExtractionError> {
        let mut window = self
            .conversations
            .fetch(user_id, None, self.config.extraction_window)
            .await?;
        if window.is_empty() {
            return Ok(ExtractionReport::default());
        }
        window.reverse();

        let request = CompletionRequest {
            model: self.model.clone(),
            system_prompt: String::new(),
            messages: vec![ChatMessage::user(prompts::extraction_prompt(&window))],
            max_tokens: EXTRACTION_MAX_TOKENS,
            temperature: EXTRACTION_TEMPERATURE,
        };

        debug!(
            user_id,
            provider = self.provider.name(),
            window = window.len(),
            "Sending extraction request"
        );

        let completion = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                ProviderError::Timeout(format!("extraction exceeded {}s", self.timeout.as_secs()))
            })??;

        let parsed = parse_extraction(&completion.text)?;
        let mut report = ExtractionReport {
            stored: 0,
            skipped: parsed.skipped,
        };
        for memory in parsed.memories {
            self.memories.upsert(user_id, memory).await?;
            report.stored += 1;
        }
        Ok(report)
    }
}
