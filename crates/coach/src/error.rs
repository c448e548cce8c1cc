//! Errors surfaced by the chat service.
//!
//! Provider failures on the reply path never appear here: they turn into the
//! fallback reply. `Provider` is only returned by explicit provider calls
//! such as health checks.

use disha_core::error::{ProviderError, StoreError};
use thiserror::Error;

/// Upper bound on a single user message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 10_000;

#[derive(Debug, Error)]
pub enum CoachError {
    #[error("Message is empty")]
    EmptyMessage,

    #[error("Message is {len} characters, limit is {MAX_MESSAGE_CHARS}")]
    MessageTooLong { len: usize },

    #[error("Profile is missing required fields: {}", missing.join(", "))]
    IncompleteProfile { missing: Vec<&'static str> },

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl From<disha_core::Error> for CoachError {
    fn from(err: disha_core::Error) -> Self {
        match err {
            disha_core::Error::Validation(msg) => CoachError::Validation(msg),
        }
    }
}
