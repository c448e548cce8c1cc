//! Protocols: canned guidance blocks triggered by keywords in a message.
//!
//! Protocols are global reference data, seeded once and read-only at runtime.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Protocol {
    /// Unique name
    pub name: String,

    /// Free-form label (symptom, emergency, policy, ...)
    pub category: String,

    /// Trigger keywords, matched as case-insensitive substrings
    pub keywords: Vec<String>,

    /// Guidance injected into the system prompt when matched
    pub response_template: String,

    /// 1..=10, higher sorts first in the registry
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    5
}

/// Read access to the protocol registry plus one-time seeding.
#[async_trait]
pub trait ProtocolRegistry: Send + Sync {
    /// All protocols in registry order: priority desc, then insertion order.
    async fn list(&self) -> std::result::Result<Vec<Protocol>, StoreError>;

    /// Insert each protocol whose name is not present yet. Returns how many
    /// were inserted.
    async fn seed(&self, protocols: &[Protocol]) -> std::result::Result<usize, StoreError>;
}
