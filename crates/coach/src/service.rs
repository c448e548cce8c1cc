//! The chat service: one incoming message in, one reply out.
//!
//! A turn runs under a per-user async mutex:
//!
//! 1. Validate and trim the message
//! 2. Load the user, recent history, memories and matching protocols
//! 3. Assemble the prompt under the token budget
//! 4. Persist the user message
//! 5. Call the provider once (bounded by a timeout)
//! 6. Persist the reply, or answer with the fallback and persist nothing more
//! 7. Dispatch memory extraction when the message count crosses a watermark

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use disha_config::AppConfig;
use disha_core::error::ProviderError;
use disha_core::memory::{MemoryRecord, MemoryStore, NewMemory};
use disha_core::message::{ConversationStore, Message, MessageId, Role};
use disha_core::protocol::{Protocol, ProtocolRegistry};
use disha_core::provider::{CompletionRequest, Provider};
use disha_core::user::{ProfileStore, ProfileUpdate, User};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::context::{
    AssemblyError, AssemblyInput, AssemblyMetadata, ContextAssembler, TokenBudget, TokenEstimator,
};
use crate::curator::MemoryCurator;
use crate::error::{CoachError, MAX_MESSAGE_CHARS};
use crate::prompts::FALLBACK_REPLY;
use crate::protocols::{default_protocols, match_protocols};

/// Largest page the history endpoint serves.
pub const MAX_PAGE_SIZE: usize = 100;

/// The store handles the service works against.
#[derive(Clone)]
pub struct Stores {
    pub profiles: Arc<dyn ProfileStore>,
    pub conversations: Arc<dyn ConversationStore>,
    pub memories: Arc<dyn MemoryStore>,
    pub protocols: Arc<dyn ProtocolRegistry>,
}

impl Stores {
    /// Use one backend for every store.
    pub fn shared<S>(store: S) -> Self
    where
        S: ProfileStore + ConversationStore + MemoryStore + ProtocolRegistry + 'static,
    {
        let store = Arc::new(store);
        Self {
            profiles: store.clone(),
            conversations: store.clone(),
            memories: store.clone(),
            protocols: store,
        }
    }
}

/// Result of one chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub reply: String,
    /// Whether a new assistant message was written.
    pub persisted: bool,
    pub user_message: Message,
    pub assistant_message: Option<Message>,
    pub context: AssemblyMetadata,
}

/// One page of history, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub total: usize,
    pub has_more: bool,
    /// Pass as `before` to get the next older page.
    pub next_cursor: Option<MessageId>,
}

/// Per-user state, held for the whole turn.
#[derive(Default)]
struct TurnState {
    /// Log size after the last successful turn in this process.
    watermark: Option<usize>,
}

/// One entry per validated username, kept for the life of the process.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<String, Arc<tokio::sync::Mutex<TurnState>>>>,
}

impl UserLocks {
    async fn acquire(&self, username: &str) -> OwnedMutexGuard<TurnState> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(username.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct ChatService {
    stores: Stores,
    provider: Arc<dyn Provider>,
    curator: MemoryCurator,
    assembler: ContextAssembler,
    config: AppConfig,
    locks: UserLocks,
    extractions: Mutex<JoinSet<()>>,
}

impl ChatService {
    pub fn new(stores: Stores, provider: Arc<dyn Provider>, config: AppConfig) -> Self {
        let timeout = Duration::from_secs(config.provider.timeout_secs);
        let curator = MemoryCurator::new(
            provider.clone(),
            stores.conversations.clone(),
            stores.memories.clone(),
            config.provider.model_name(),
            config.memory.clone(),
            timeout,
        );
        let assembler = ContextAssembler::new(
            TokenBudget::new(
                config.context.max_context_tokens,
                config.context.max_response_tokens,
            ),
            TokenEstimator::for_provider(config.provider.kind),
        );
        Self {
            stores,
            provider,
            curator,
            assembler,
            config,
            locks: UserLocks::default(),
            extractions: Mutex::new(JoinSet::new()),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Handle one incoming message for `username`.
    ///
    /// Provider failures are not errors here: the caller gets the fallback
    /// reply with `persisted = false` and only the user message is stored.
    pub async fn send_message(&self, username: &str, text: &str) -> Result<ChatOutcome, CoachError> {
        let username = validate_username(username)?;
        let current = validate_message(text)?;
        let mut turn = self.locks.acquire(username).await;

        let user = self.stores.profiles.get_or_create(username).await?;
        if user.onboarding_completed {
            let missing = user.profile.missing_required();
            if !missing.is_empty() {
                return Err(CoachError::IncompleteProfile { missing });
            }
        }

        let count_before = self.stores.conversations.count(user.id).await?;
        let mut history = self
            .stores
            .conversations
            .fetch(user.id, None, self.config.context.history_fetch_limit)
            .await?;
        history.reverse();

        let (memories, registry) = if user.onboarding_completed {
            (
                self.curator.recall(user.id).await?,
                self.stores.protocols.list().await?,
            )
        } else {
            (Vec::new(), Vec::new())
        };
        let mut matched = match_protocols(current, &registry);
        matched.truncate(self.config.protocols.max_injected);

        let assembled = self
            .assembler
            .assemble(&AssemblyInput {
                user: &user,
                memories: &memories,
                protocols: &matched,
                history: &history,
                current,
            })
            .map_err(|e| match e {
                AssemblyError::IncompleteProfile { missing } => {
                    CoachError::IncompleteProfile { missing }
                }
            })?;

        let estimator = self.assembler.estimator();
        let user_message = self
            .stores
            .conversations
            .append(user.id, Role::User, current, estimator.text(current))
            .await?;

        let request = CompletionRequest {
            model: self.config.provider.model_name(),
            system_prompt: assembled.system_prompt,
            messages: assembled.messages,
            max_tokens: u32::try_from(self.config.context.max_response_tokens).unwrap_or(u32::MAX),
            temperature: self.config.provider.temperature,
        };

        debug!(
            user = %username,
            provider = self.provider.name(),
            model = %request.model,
            prompt_tokens = assembled.metadata.total_tokens,
            history = assembled.metadata.history.included,
            "Sending chat request"
        );

        let reply = match self.call_provider(request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(user = %username, error = %e, "Provider call failed, sending fallback reply");
                return Ok(ChatOutcome {
                    reply: FALLBACK_REPLY.to_string(),
                    persisted: false,
                    user_message,
                    assistant_message: None,
                    context: assembled.metadata,
                });
            }
        };

        let assistant_message = self
            .stores
            .conversations
            .append(user.id, Role::Assistant, &reply, estimator.text(&reply))
            .await?;

        // A failed turn may have crossed a multiple of the interval by
        // appending its user message; measure from the last successful turn.
        let count_after = count_before + 2;
        let since = turn.watermark.unwrap_or(count_before);
        turn.watermark = Some(count_after);
        if self.curator.is_due(since, count_after) {
            self.dispatch_extraction(user.id).await;
        }

        Ok(ChatOutcome {
            reply,
            persisted: true,
            user_message,
            assistant_message: Some(assistant_message),
            context: assembled.metadata,
        })
    }

    async fn call_provider(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let timeout = Duration::from_secs(self.config.provider.timeout_secs);
        let completion = tokio::time::timeout(timeout, self.provider.complete(request))
            .await
            .map_err(|_| ProviderError::Timeout(format!("no reply within {}s", timeout.as_secs())))??;
        let text = completion.text.trim();
        if text.is_empty() {
            return Err(ProviderError::MalformedOutput("empty reply".into()));
        }
        Ok(text.to_string())
    }

    async fn dispatch_extraction(&self, user_id: i64) {
        if !self.config.memory.background_extraction {
            self.curator.extract(user_id).await;
            return;
        }
        let curator = self.curator.clone();
        let mut tasks = self.extractions.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            curator.extract(user_id).await;
        });
        debug!(user_id, "Memory extraction dispatched");
    }

    /// Wait for every background extraction spawned so far.
    pub async fn drain_extractions(&self) {
        let mut tasks = {
            let mut guard = self.extractions.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Memory extraction task failed");
            }
        }
    }

    // ── Users ──────────────────────────────────────────────────────────

    pub async fn get_or_create_user(&self, username: &str) -> Result<User, CoachError> {
        let username = validate_username(username)?;
        Ok(self.stores.profiles.get_or_create(username).await?)
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<User>, CoachError> {
        Ok(self.stores.profiles.get(username).await?)
    }

    /// Create (or fetch) a user, optionally recording their name.
    pub async fn create_user(
        &self,
        username: &str,
        full_name: Option<String>,
    ) -> Result<User, CoachError> {
        let username = validate_username(username)?;
        let user = self.stores.profiles.get_or_create(username).await?;
        match full_name {
            Some(name) if !name.trim().is_empty() => {
                let mut profile = user.profile;
                profile.full_name = Some(name.trim().to_string());
                Ok(self
                    .stores
                    .profiles
                    .update_profile(&user.username, profile, user.onboarding_completed)
                    .await?)
            }
            _ => Ok(user),
        }
    }

    /// Merge onboarding answers and move the user to the regular state.
    ///
    /// Nothing is written unless the merged profile is valid and complete.
    pub async fn complete_onboarding(
        &self,
        username: &str,
        answers: ProfileUpdate,
    ) -> Result<User, CoachError> {
        let username = validate_username(username)?;
        let _turn = self.locks.acquire(username).await;
        let user = self.stores.profiles.get_or_create(username).await?;
        let profile = answers.apply(user.profile);
        profile.validate()?;
        if !profile.is_complete() {
            return Err(CoachError::IncompleteProfile {
                missing: profile.missing_required(),
            });
        }
        let user = self
            .stores
            .profiles
            .update_profile(username, profile, true)
            .await?;
        info!(user = %username, "Onboarding completed");
        Ok(user)
    }

    // ── History ────────────────────────────────────────────────────────

    /// Newest-first page of messages older than `before`.
    pub async fn history(
        &self,
        username: &str,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<MessagePage, CoachError> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(CoachError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        let user = self.stores.profiles.get_or_create(username).await?;
        let mut messages = self
            .stores
            .conversations
            .fetch(user.id, before, limit + 1)
            .await?;
        let has_more = messages.len() > limit;
        messages.truncate(limit);
        let next_cursor = if has_more {
            messages.last().map(|m| m.id)
        } else {
            None
        };
        let total = self.stores.conversations.count(user.id).await?;
        Ok(MessagePage {
            messages,
            total,
            has_more,
            next_cursor,
        })
    }

    // ── Memories ───────────────────────────────────────────────────────

    pub async fn memories(&self, username: &str) -> Result<Vec<MemoryRecord>, CoachError> {
        let user = self.stores.profiles.get_or_create(username).await?;
        Ok(self.stores.memories.list(user.id).await?)
    }

    pub async fn add_memory(
        &self,
        username: &str,
        memory: NewMemory,
    ) -> Result<MemoryRecord, CoachError> {
        if memory.key.trim().is_empty() || memory.value.trim().is_empty() {
            return Err(CoachError::Validation("memory key and value must not be empty".into()));
        }
        let user = self.stores.profiles.get_or_create(username).await?;
        Ok(self.stores.memories.upsert(user.id, memory).await?)
    }

    // ── Protocols ──────────────────────────────────────────────────────

    pub async fn protocols(&self) -> Result<Vec<Protocol>, CoachError> {
        Ok(self.stores.protocols.list().await?)
    }

    /// Insert the built-in protocols that are not present yet.
    pub async fn seed_protocols(&self) -> Result<usize, CoachError> {
        let inserted = self.stores.protocols.seed(&default_protocols()).await?;
        info!(inserted, "Protocols seeded");
        Ok(inserted)
    }

    /// A cheap read against storage.
    pub async fn check_storage(&self) -> Result<(), CoachError> {
        self.stores.protocols.list().await?;
        Ok(())
    }

    /// Whether the provider passes its health check.
    pub async fn check_provider(&self) -> bool {
        match self.provider.health_check().await {
            Ok(healthy) => healthy,
            Err(e) => {
                warn!(provider = self.provider.name(), error = %e, "Provider health check failed");
                false
            }
        }
    }
}

/// Trim a username and check it is 3 to 100 characters.
pub fn validate_username(username: &str) -> Result<&str, CoachError> {
    let trimmed = username.trim();
    let len = trimmed.chars().count();
    if !(3..=100).contains(&len) {
        return Err(CoachError::Validation(format!(
            "username must be 3 to 100 characters, got {len}"
        )));
    }
    Ok(trimmed)
}

/// Trim and bound an incoming message.
pub fn validate_message(text: &str) -> Result<&str, CoachError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CoachError::EmptyMessage);
    }
    let len = trimmed.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(CoachError::MessageTooLong { len });
    }
    Ok(trimmed)
}
