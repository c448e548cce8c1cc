//! Demo provider: offline keyword-matched replies.
//!
//! Lets the whole stack run without an API key. Replies are picked from the
//! last user message only; the system prompt is ignored.

use async_trait::async_trait;
use disha_core::error::ProviderError;
use disha_core::message::Role;
use disha_core::provider::*;
use tracing::debug;

const WELCOME: &str = "Hi! I'm Disha, your AI health coach. How can I help you today?";

const FEVER: &str = "I'm sorry to hear you have a fever. For fever management:\n\n\
- If temp > 103°F or lasts > 3 days, see a doctor\n\
- Stay hydrated and rest\n\
- You can take paracetamol as directed\n\
- Monitor your temperature regularly\n\n\
How long have you had this fever?";

const HEADACHE: &str = "Headaches can be tough! Here's what might help:\n\n\
- Rest in a quiet, dark room\n\
- Stay hydrated - drink plenty of water\n\
- Apply a cold compress to your forehead\n\
- Avoid screens and bright lights\n\n\
If it persists or gets worse, please see a doctor. Is there anything else bothering you?";

const STOMACH: &str = "For stomach discomfort, I'd recommend:\n\n\
- Eat light, bland foods like rice and bananas\n\
- Stay hydrated with water or ORS\n\
- Avoid spicy and oily foods\n\
- Rest for a bit\n\n\
If pain is severe or persists, please consult a doctor. When did this start?";

const GREETING: &str = "Hello! I'm Disha, your AI health coach. I'm here to help you with \
health questions and wellness guidance. How are you feeling today?";

const THANKS: &str =
    "You're welcome! I'm always here to help. Is there anything else you'd like to know about your health?";

const QUESTION: &str = "That's a great question! I'm running in demo mode right now, so I can't \
give personalized guidance yet. Would you like to tell me more about what's concerning you?";

const GENERIC: [&str; 5] = [
    "I understand. Can you tell me more about what you're experiencing?",
    "Thanks for sharing that with me. How long has this been going on?",
    "I see. Are there any other symptoms you're noticing?",
    "Got it. On a scale of 1-10, how would you rate your discomfort?",
    "That's helpful to know. Have you experienced anything like this before?",
];

/// Canned-reply provider for local runs and demos.
#[derive(Debug, Default, Clone)]
pub struct DemoProvider;

impl DemoProvider {
    pub fn new() -> Self {
        Self
    }

    /// Pick a reply for `text`. Topic keywords take precedence over
    /// greetings, greetings over thanks, thanks over questions.
    pub fn reply_for(text: &str) -> String {
        let lower = text.to_lowercase();
        let contains_any = |words: &[&str]| words.iter().any(|w| lower.contains(w));
        let has_word = |words: &[&str]| {
            lower
                .split(|c: char| !c.is_alphanumeric())
                .any(|token| words.contains(&token))
        };

        let reply = if contains_any(&["fever", "temperature", "hot"]) {
            FEVER
        } else if contains_any(&["headache", "head pain", "migraine"]) {
            HEADACHE
        } else if contains_any(&["stomach", "tummy", "abdomen"]) {
            STOMACH
        } else if has_word(&["hi", "hello", "hey"]) {
            GREETING
        } else if contains_any(&["thank"]) {
            THANKS
        } else if lower.contains('?') {
            QUESTION
        } else {
            use rand::Rng;
            let mut rng = rand::rng();
            GENERIC[rng.random_range(0..GENERIC.len())]
        };
        reply.to_string()
    }
}

#[async_trait]
impl Provider for DemoProvider {
    fn name(&self) -> &str {
        "demo"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        // Extraction calls carry no persona; nothing worth remembering in demo mode.
        let text = if request.system_prompt.is_empty() {
            "[]".to_string()
        } else {
            match request.messages.iter().rev().find(|m| m.role == Role::User) {
                Some(last) => Self::reply_for(&last.content),
                None => WELCOME.to_string(),
            }
        };

        debug!(provider = "demo", chars = text.len(), "Produced canned reply");

        let completion_tokens = text.len().div_ceil(4) as u32;
        Ok(Completion {
            text,
            usage: Some(Usage {
                prompt_tokens: 0,
                completion_tokens,
                total_tokens: completion_tokens,
            }),
            model: "demo".into(),
        })
    }
}
