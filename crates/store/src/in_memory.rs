//! In-memory store — useful for testing and ephemeral sessions.
//!
//! Mirrors the SQLite semantics: monotonic ids, upsert on
//! `(user, category, key)`, insert-if-absent protocol seeding.

use async_trait::async_trait;
use chrono::Utc;
use disha_core::error::StoreError;
use disha_core::memory::{Importance, MemoryRecord, MemoryStore, NewMemory};
use disha_core::message::{ConversationStore, Message, MessageId, Role};
use disha_core::protocol::{Protocol, ProtocolRegistry};
use disha_core::user::{Profile, ProfileStore, User};
use std::cmp::Reverse;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    messages: Vec<Message>,
    memories: Vec<MemoryRecord>,
    protocols: Vec<Protocol>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// An in-memory store keeping every table in a Vec.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Importance desc, then recency desc, then id desc.
fn rank(memories: &mut [MemoryRecord]) {
    memories.sort_by_key(|m| (Reverse(m.importance), Reverse(m.updated_at), Reverse(m.id)));
}

#[async_trait]
impl ProfileStore for InMemoryStore {
    async fn get_or_create(&self, username: &str) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(user) = tables.users.iter().find(|u| u.username == username) {
            return Ok(user.clone());
        }
        let user = User {
            id: tables.next_id(),
            username: username.to_string(),
            onboarding_completed: false,
            profile: Profile::default(),
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn update_profile(
        &self,
        username: &str,
        profile: Profile,
        onboarding_completed: bool,
    ) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.username == username)
            .ok_or_else(|| StoreError::UserNotFound(username.to_string()))?;
        user.profile = profile;
        user.onboarding_completed = onboarding_completed;
        Ok(user.clone())
    }
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    async fn append(
        &self,
        user_id: i64,
        role: Role,
        content: &str,
        token_count: usize,
    ) -> Result<Message, StoreError> {
        let mut tables = self.tables.write().await;
        let message = Message {
            id: tables.next_id(),
            user_id,
            role,
            content: content.to_string(),
            token_count,
            created_at: Utc::now(),
        };
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn fetch(
        &self,
        user_id: i64,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .rev()
            .filter(|m| m.user_id == user_id)
            .filter(|m| before.is_none_or(|cursor| m.id < cursor))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self, user_id: i64) -> Result<usize, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.messages.iter().filter(|m| m.user_id == user_id).count())
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn upsert(&self, user_id: i64, memory: NewMemory) -> Result<MemoryRecord, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();

        if let Some(existing) = tables.memories.iter_mut().find(|m| {
            m.user_id == user_id && m.category == memory.category && m.key == memory.key
        }) {
            existing.value = memory.value;
            existing.importance = memory.importance;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let record = MemoryRecord {
            id: tables.next_id(),
            user_id,
            category: memory.category,
            key: memory.key,
            value: memory.value,
            importance: memory.importance,
            created_at: now,
            updated_at: now,
        };
        tables.memories.push(record.clone());
        Ok(record)
    }

    async fn top_k(
        &self,
        user_id: i64,
        k: usize,
        min_importance: Importance,
    ) -> Result<Vec<MemoryRecord>, StoreError> {
        let mut memories: Vec<MemoryRecord> = MemoryStore::list(self, user_id)
            .await?
            .into_iter()
            .filter(|m| m.importance >= min_importance)
            .collect();
        memories.truncate(k);
        Ok(memories)
    }

    async fn list(&self, user_id: i64) -> Result<Vec<MemoryRecord>, StoreError> {
        let tables = self.tables.read().await;
        let mut memories: Vec<MemoryRecord> = tables
            .memories
            .iter()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        rank(&mut memories);
        Ok(memories)
    }
}

#[async_trait]
impl ProtocolRegistry for InMemoryStore {
    async fn list(&self) -> Result<Vec<Protocol>, StoreError> {
        let tables = self.tables.read().await;
        let mut protocols = tables.protocols.clone();
        // stable: equal priorities keep insertion order
        protocols.sort_by_key(|p| Reverse(p.priority));
        Ok(protocols)
    }

    async fn seed(&self, protocols: &[Protocol]) -> Result<usize, StoreError> {
        let mut tables = self.tables.write().await;
        let mut inserted = 0;
        for protocol in protocols {
            if !tables.protocols.iter().any(|p| p.name == protocol.name) {
                tables.protocols.push(protocol.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}
