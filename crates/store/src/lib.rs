//! Storage implementations for Disha.
//!
//! Both stores implement every collaborator trait from `disha_core`
//! (`ProfileStore`, `ConversationStore`, `MemoryStore`, `ProtocolRegistry`),
//! so one handle can be shared across the whole service.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;
