//! Context assembly: turns one incoming message into a provider request.
//!
//! Two states, chosen by the user's onboarding flag:
//!
//! 1. **Onboarding**: the fixed onboarding persona, nothing injected
//! 2. **Regular**: persona, profile, top memories, matched protocols and
//!    guidelines, all rendered into the system prompt
//!
//! The system prompt and the current user turn are must-keep. History fills
//! the remaining budget as a contiguous suffix (see [`select_history`]).
//!
//! # Determinism
//!
//! Identical inputs always produce identical outputs. No clock or random
//! source is read during assembly.

use crate::context::budget::{HistoryWindow, TokenBudget, select_history};
use crate::context::token::TokenEstimator;
use crate::prompts;
use disha_core::memory::MemoryRecord;
use disha_core::message::Message;
use disha_core::protocol::Protocol;
use disha_core::provider::ChatMessage;
use disha_core::user::User;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

// ── Types ─────────────────────────────────────────────────────────────────

/// All inputs required by the assembler for a single provider call.
pub struct AssemblyInput<'a> {
    pub user: &'a User,
    /// Recalled memories, already ranked and limited.
    pub memories: &'a [MemoryRecord],
    /// Matched protocols, already capped, in match order.
    pub protocols: &'a [&'a Protocol],
    /// Prior messages in chronological order, not including the current one.
    pub history: &'a [Message],
    /// The current user message, already trimmed.
    pub current: &'a str,
}

/// The assembled context, ready for a provider call.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub system_prompt: String,
    /// History window followed by the current user turn.
    pub messages: Vec<ChatMessage>,
    pub metadata: AssemblyMetadata,
}

/// What went into the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub onboarding: bool,
    pub system_tokens: usize,
    pub current_tokens: usize,
    pub history: HistoryWindow,
    /// Estimated prompt tokens (system, history and current turn).
    pub total_tokens: usize,
    /// Configured context budget.
    pub budget: usize,
    pub protocols_used: Vec<String>,
    pub memories_used: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("Profile is missing required fields: {}", missing.join(", "))]
    IncompleteProfile { missing: Vec<&'static str> },
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// The context assembler. Stateless, create one and reuse it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextAssembler {
    budget: TokenBudget,
    estimator: TokenEstimator,
}

impl ContextAssembler {
    pub fn new(budget: TokenBudget, estimator: TokenEstimator) -> Self {
        Self { budget, estimator }
    }

    pub fn budget(&self) -> TokenBudget {
        self.budget
    }

    pub fn estimator(&self) -> TokenEstimator {
        self.estimator
    }

    /// Build the system prompt and message list for one turn.
    ///
    /// A regular-state user whose profile lacks required fields is an error;
    /// an exhausted budget is not, it only empties the history window.
    pub fn assemble(&self, input: &AssemblyInput<'_>) -> Result<AssembledContext, AssemblyError> {
        let onboarding = !input.user.onboarding_completed;
        let (system_prompt, memories_used, protocols_used) = if onboarding {
            (prompts::ONBOARDING_PERSONA.to_string(), 0, Vec::new())
        } else {
            let missing = input.user.profile.missing_required();
            if !missing.is_empty() {
                return Err(AssemblyError::IncompleteProfile { missing });
            }
            (
                Self::regular_prompt(input),
                input.memories.len(),
                input.protocols.iter().map(|p| p.name.clone()).collect(),
            )
        };

        let system_tokens = self.estimator.message(&system_prompt);
        let current_tokens = self.estimator.message(input.current);
        let must_keep = system_tokens + current_tokens;

        let costs: Vec<usize> = input
            .history
            .iter()
            .map(|m| self.estimator.message(&m.content))
            .collect();
        let window = select_history(&self.budget, must_keep, &costs);
        if window.degraded {
            warn!(
                must_keep,
                budget = self.budget.context,
                reserve = self.budget.response_reserve,
                "Must-keep context exhausts the budget, sending no history"
            );
        }

        let mut messages: Vec<ChatMessage> = input.history[window.start..]
            .iter()
            .map(|m| ChatMessage {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        messages.push(ChatMessage::user(input.current));

        Ok(AssembledContext {
            system_prompt,
            messages,
            metadata: AssemblyMetadata {
                onboarding,
                system_tokens,
                current_tokens,
                total_tokens: must_keep + window.tokens,
                history: window,
                budget: self.budget.context,
                protocols_used,
                memories_used,
            },
        })
    }

    fn regular_prompt(input: &AssemblyInput<'_>) -> String {
        let mut sections = vec![
            prompts::COACH_PERSONA.to_string(),
            prompts::render_profile(&input.user.profile),
        ];
        sections.extend(prompts::render_memories(input.memories));
        sections.extend(prompts::render_protocols(input.protocols));
        sections.push(prompts::GUIDELINES.to_string());
        sections.join("\n\n")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::match_protocols;
    use chrono::Utc;
    use disha_core::memory::{Importance, MemoryCategory};
    use disha_core::message::Role;
    use disha_core::user::Profile;

    // ── Helpers ────────────────────────────────────────────────────────

    fn test_user(onboarded: bool) -> User {
        User {
            id: 1,
            username: "asha".into(),
            onboarding_completed: onboarded,
            profile: Profile {
                full_name: Some("Asha".into()),
                age: Some(34),
                gender: Some("female".into()),
                weight_kg: Some(62.0),
                height_cm: Some(165.0),
                ..Default::default()
            },
            created_at: Utc::now(),
        }
    }

    fn test_memory(key: &str, value: &str) -> MemoryRecord {
        MemoryRecord {
            id: 1,
            user_id: 1,
            category: MemoryCategory::MedicalHistory,
            key: key.into(),
            value: value.into(),
            importance: Importance::new(4).unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn test_protocol(name: &str, keywords: &[&str]) -> Protocol {
        Protocol {
            name: name.into(),
            category: "symptom".into(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            response_template: format!("{name} steps"),
            priority: 5,
        }
    }

    fn test_history(n: usize) -> Vec<Message> {
        (0..n)
            .map(|i| Message {
                id: i as i64 + 1,
                user_id: 1,
                role: if i % 2 == 0 { Role::User } else { Role::Assistant },
                // fixed width so every message costs the same
                content: format!("history message {i:04}"),
                token_count: 6,
                created_at: Utc::now(),
            })
            .collect()
    }

    fn input<'a>(
        user: &'a User,
        memories: &'a [MemoryRecord],
        protocols: &'a [&'a Protocol],
        history: &'a [Message],
    ) -> AssemblyInput<'a> {
        AssemblyInput {
            user,
            memories,
            protocols,
            history,
            current: "Hello",
        }
    }

    // ── Tests ──────────────────────────────────────────────────────────

    #[test]
    fn onboarding_ignores_memories_and_protocols() {
        let asm = ContextAssembler::default();
        let user = test_user(false);
        let memories = vec![test_memory("allergy", "penicillin")];
        let fever = test_protocol("Fever Protocol", &["fever"]);
        let protocols = vec![&fever];

        let result = asm
            .assemble(&input(&user, &memories, &protocols, &[]))
            .unwrap();

        assert_eq!(result.system_prompt, prompts::ONBOARDING_PERSONA);
        assert!(result.metadata.onboarding);
        assert!(result.metadata.protocols_used.is_empty());
        assert_eq!(result.metadata.memories_used, 0);
    }

    #[test]
    fn regular_prompt_has_all_sections_in_order() {
        let asm = ContextAssembler::default();
        let user = test_user(true);
        let memories = vec![test_memory("allergy", "penicillin")];
        let fever = test_protocol("Fever Protocol", &["fever"]);
        let protocols = vec![&fever];

        let result = asm
            .assemble(&input(&user, &memories, &protocols, &[]))
            .unwrap();
        let prompt = &result.system_prompt;

        let persona = prompt.find("You are Disha").unwrap();
        let profile = prompt.find("User Profile:").unwrap();
        let memory = prompt.find("- allergy: penicillin").unwrap();
        let protocol = prompt.find("Fever Protocol:\nFever Protocol steps").unwrap();
        let guidelines = prompt.find("Important Guidelines:").unwrap();
        assert!(persona < profile && profile < memory && memory < protocol && protocol < guidelines);

        assert_eq!(result.metadata.protocols_used, vec!["Fever Protocol"]);
        assert_eq!(result.metadata.memories_used, 1);
    }

    #[test]
    fn empty_sections_are_omitted() {
        let asm = ContextAssembler::default();
        let user = test_user(true);
        let result = asm.assemble(&input(&user, &[], &[], &[])).unwrap();
        assert!(!result.system_prompt.contains("Relevant Context"));
        assert!(!result.system_prompt.contains("Relevant Medical Protocols"));
    }

    #[test]
    fn incomplete_profile_is_an_error_when_onboarded() {
        let asm = ContextAssembler::default();
        let mut user = test_user(true);
        user.profile.weight_kg = None;
        let err = asm.assemble(&input(&user, &[], &[], &[])).unwrap_err();
        assert_eq!(
            err,
            AssemblyError::IncompleteProfile {
                missing: vec!["weight_kg"]
            }
        );

        // the same profile is fine while onboarding
        user.onboarding_completed = false;
        assert!(asm.assemble(&input(&user, &[], &[], &[])).is_ok());
    }

    #[test]
    fn current_message_is_last() {
        let asm = ContextAssembler::default();
        let user = test_user(true);
        let history = test_history(4);
        let result = asm.assemble(&input(&user, &[], &[], &history)).unwrap();
        assert_eq!(result.messages.len(), 5);
        assert_eq!(result.messages.last().unwrap(), &ChatMessage::user("Hello"));
        assert_eq!(result.messages[0].content, "history message 0000");
    }

    #[test]
    fn budget_keeps_exactly_last_eight_of_twelve() {
        let user = test_user(true);
        let history = test_history(12);
        let estimator = TokenEstimator::Bpe;
        let per_message = estimator.message(&history[0].content);
        let must_keep = estimator.message(&ContextAssembler::regular_prompt(&input(
            &user,
            &[],
            &[],
            &history,
        ))) + estimator.message("Hello");
        let reserve = 100;
        let budget = TokenBudget::new(must_keep + reserve + 8 * per_message + per_message / 2, reserve);

        let result = ContextAssembler::new(budget, estimator)
            .assemble(&input(&user, &[], &[], &history))
            .unwrap();

        assert_eq!(result.metadata.history.included, 8);
        assert_eq!(result.metadata.history.dropped, 4);
        let kept: Vec<&str> = result.messages[..8].iter().map(|m| m.content.as_str()).collect();
        let expected: Vec<&str> = history[4..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(kept, expected);
        assert!(result.metadata.total_tokens <= budget.context - budget.response_reserve);
    }

    #[test]
    fn degraded_budget_still_sends_current_turn() {
        let asm = ContextAssembler::new(TokenBudget::new(50, 40), TokenEstimator::Bpe);
        let user = test_user(true);
        let history = test_history(6);
        let result = asm.assemble(&input(&user, &[], &[], &history)).unwrap();
        assert!(result.metadata.history.degraded);
        assert_eq!(result.metadata.history.included, 0);
        assert_eq!(result.messages, vec![ChatMessage::user("Hello")]);
    }

    #[test]
    fn matched_protocols_flow_into_prompt() {
        let asm = ContextAssembler::default();
        let user = test_user(true);
        let registry = vec![
            test_protocol("Fever Protocol", &["fever", "temperature", "hot"]),
            test_protocol("Headache", &["headache"]),
        ];
        let matched = match_protocols("I have a fever and it's 101F", &registry);
        let result = asm
            .assemble(&AssemblyInput {
                user: &user,
                memories: &[],
                protocols: &matched,
                history: &[],
                current: "I have a fever and it's 101F",
            })
            .unwrap();
        assert_eq!(result.metadata.protocols_used, vec!["Fever Protocol"]);
        assert!(!result.system_prompt.contains("Headache:"));
    }

    #[test]
    fn deterministic_assembly() {
        let asm = ContextAssembler::default();
        let user = test_user(true);
        let memories = vec![test_memory("sleep", "6 hours")];
        let history = test_history(10);
        let first = asm.assemble(&input(&user, &memories, &[], &history)).unwrap();
        let second = asm.assemble(&input(&user, &memories, &[], &history)).unwrap();
        assert_eq!(first.system_prompt, second.system_prompt);
        assert_eq!(first.messages, second.messages);
        assert_eq!(first.metadata, second.metadata);
    }
}
