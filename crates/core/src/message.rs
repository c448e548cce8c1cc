//! Message domain types and the conversation log contract.
//!
//! The message log is append-only and is the source of truth for a
//! conversation. Messages are totally ordered per user by their integer id,
//! which doubles as the pagination cursor.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Monotonic message identifier. Higher means more recent.
pub type MessageId = i64;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The coach
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// A persisted message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub user_id: i64,
    pub role: Role,
    pub content: String,
    /// Token estimate computed when the message was written
    pub token_count: usize,
    pub created_at: DateTime<Utc>,
}

/// The append-only conversation log.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a message and return it with its assigned id.
    async fn append(
        &self,
        user_id: i64,
        role: Role,
        content: &str,
        token_count: usize,
    ) -> std::result::Result<Message, StoreError>;

    /// Fetch up to `limit` messages older than `before` (or the newest ones
    /// when `before` is `None`), newest first.
    async fn fetch(
        &self,
        user_id: i64,
        before: Option<MessageId>,
        limit: usize,
    ) -> std::result::Result<Vec<Message>, StoreError>;

    /// Total number of messages logged for the user.
    async fn count(&self, user_id: i64) -> std::result::Result<usize, StoreError>;
}
