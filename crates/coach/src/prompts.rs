//! Persona text and prompt section renderers.

use disha_core::memory::MemoryRecord;
use disha_core::message::{Message, Role};
use disha_core::protocol::Protocol;
use disha_core::user::Profile;

/// System prompt while a user is still onboarding. Nothing else is injected.
pub const ONBOARDING_PERSONA: &str = "You are Disha, India's first AI health coach. \
You're having your first conversation with a new user.

Your goal is to:
1. Welcome them warmly and introduce yourself naturally (don't sound robotic)
2. Understand their health goals and current situation
3. Gather basic information: age, gender, height, weight, any medical conditions, current medications, allergies
4. Ask about their lifestyle: sleep, exercise, diet, stress levels
5. Be empathetic and conversational - you're building a relationship, not conducting an interrogation

Important:
- Ask ONE question at a time, keep it conversational
- Show genuine interest in their responses
- Be supportive and non-judgmental
- Sound like a caring friend, not a clinical chatbot
- Use simple language, avoid medical jargon unless necessary

Keep your responses concise and natural. Think WhatsApp chat, not medical consultation.";

/// Opening of the regular-state system prompt.
pub const COACH_PERSONA: &str = "You are Disha, India's first AI health coach. \
You communicate like a caring friend on WhatsApp.

Your personality:
- Warm, empathetic, and supportive
- Use simple language, avoid medical jargon
- Keep responses concise (2-3 sentences usually)
- Be conversational, not robotic or clinical
- Show you remember past conversations
- Ask follow-up questions when appropriate";

/// Closing of the regular-state system prompt.
pub const GUIDELINES: &str = "Important Guidelines:
- For medical emergencies, always advise immediate medical attention
- You're a health coach, not a doctor - don't diagnose or prescribe
- Use the protocols above when relevant
- Be encouraging about healthy habits
- Keep responses short and WhatsApp-friendly";

/// Sent to the user when the provider call fails. Never persisted.
pub const FALLBACK_REPLY: &str = "I'm having trouble responding right now. \
Please try again in a moment. If this is an emergency, call 102/108 or go to the nearest hospital.";

/// Render the profile section. Empty fields are skipped.
pub fn render_profile(profile: &Profile) -> String {
    let mut lines = vec!["User Profile:".to_string()];
    if let Some(name) = &profile.full_name {
        lines.push(format!("- Name: {name}"));
    }
    if let Some(age) = profile.age {
        lines.push(format!("- Age: {age}"));
    }
    if let Some(gender) = &profile.gender {
        lines.push(format!("- Gender: {gender}"));
    }
    if let Some(weight) = profile.weight_kg {
        lines.push(format!("- Weight: {weight} kg"));
    }
    if let Some(height) = profile.height_cm {
        lines.push(format!("- Height: {height} cm"));
    }
    let lists = [
        ("Medical Conditions", &profile.medical_conditions),
        ("Medications", &profile.medications),
        ("Allergies", &profile.allergies),
    ];
    for (label, items) in lists {
        if !items.is_empty() {
            lines.push(format!("- {label}: {}", items.join(", ")));
        }
    }
    lines.join("\n")
}

/// Render memories as `- key: value` lines, or nothing when empty.
pub fn render_memories(memories: &[MemoryRecord]) -> Option<String> {
    if memories.is_empty() {
        return None;
    }
    let mut out = String::from("Relevant Context from Past Conversations:");
    for memory in memories {
        out.push_str(&format!("\n- {}: {}", memory.key, memory.value));
    }
    Some(out)
}

/// Render matched protocols, name then template, or nothing when empty.
pub fn render_protocols(protocols: &[&Protocol]) -> Option<String> {
    if protocols.is_empty() {
        return None;
    }
    let mut out = String::from("Relevant Medical Protocols:");
    for protocol in protocols {
        out.push_str(&format!("\n\n{}:\n{}", protocol.name, protocol.response_template));
    }
    Some(out)
}

/// Instruction sent to the provider to pull durable facts from a dialogue window.
pub fn extraction_prompt(window: &[Message]) -> String {
    let transcript: Vec<String> = window
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect();

    format!(
        "Analyze this conversation and extract key information that should be remembered about the user.
Return ONLY a JSON array of memories in this format:
[{{\"category\": \"health_goal\", \"key\": \"primary_goal\", \"value\": \"description\", \"importance\": 3}}]

Categories: health_goal, preference, medical_history, lifestyle
Importance: integer from 1 (trivia) to 5 (critical, e.g. allergies or chronic conditions)
Use short snake_case keys and reuse the same key when a fact is updated.

Conversation:
{}

Extract only factual, important information. Return [] if nothing significant.",
        transcript.join("\n")
    )
}
