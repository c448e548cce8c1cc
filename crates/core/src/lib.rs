//! # Disha Core
//!
//! Domain types, collaborator traits, and error definitions for the Disha
//! health-coaching backend. This crate has **no framework dependencies**: it
//! defines the domain model that every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Storage and LLM access are traits defined here. Implementations live in
//! `disha-store` and `disha-providers`, and the coaching pipeline in
//! `disha-coach` receives them as `Arc<dyn ...>` handles. This enables:
//! - Swapping SQLite for the in-memory store in tests
//! - Scripted providers instead of network calls
//! - A clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod memory;
pub mod message;
pub mod protocol;
pub mod provider;
pub mod user;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, StoreError};
pub use memory::{Importance, MemoryCategory, MemoryRecord, MemoryStore, NewMemory};
pub use message::{ConversationStore, Message, MessageId, Role};
pub use protocol::{Protocol, ProtocolRegistry};
pub use provider::{ChatMessage, Completion, CompletionRequest, Provider, Usage};
pub use user::{Profile, ProfileStore, ProfileUpdate, User};
