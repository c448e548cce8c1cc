//! The coaching pipeline: one incoming message, one reply.
//!
//! 1. **Validate** the message and load the user
//! 2. **Recall** top memories and **match** protocols (regular state only)
//! 3. **Assemble** the prompt under the token budget
//! 4. **Call** the provider once, falling back to a fixed reply on failure
//! 5. **Curate** memories when the message count crosses a watermark

pub mod context;
pub mod curator;
pub mod error;
pub mod prompts;
pub mod protocols;
pub mod service;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{
    AssembledContext, AssemblyError, AssemblyInput, AssemblyMetadata, ContextAssembler,
    HistoryWindow, TokenBudget, TokenEstimator,
};
pub use curator::{ExtractionReport, MemoryCurator, crosses_watermark, parse_extraction};
pub use error::{CoachError, MAX_MESSAGE_CHARS};
pub use prompts::FALLBACK_REPLY;
pub use protocols::{default_protocols, match_protocols};
pub use service::{ChatOutcome, ChatService, MessagePage, Stores};
