//! Keyword matching against the protocol registry, plus the built-in seed set.

use disha_core::protocol::Protocol;

/// Protocols with at least one keyword that appears, case-insensitively,
/// anywhere in `text`. Registry order is preserved.
pub fn match_protocols<'a>(text: &str, protocols: &'a [Protocol]) -> Vec<&'a Protocol> {
    let haystack = text.to_lowercase();
    protocols
        .iter()
        .filter(|protocol| {
            protocol.keywords.iter().any(|keyword| {
                let needle = keyword.trim().to_lowercase();
                !needle.is_empty() && haystack.contains(&needle)
            })
        })
        .collect()
}

fn protocol(name: &str, category: &str, keywords: &[&str], template: &str, priority: u8) -> Protocol {
    Protocol {
        name: name.into(),
        category: category.into(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        response_template: template.into(),
        priority,
    }
}

/// The protocols written by `seed` on first start.
pub fn default_protocols() -> Vec<Protocol> {
    vec![
        protocol(
            "Fever Management",
            "symptom",
            &["fever", "temperature", "hot", "burning up"],
            "For fever management:
- If temp > 103°F (39.4°C) or fever lasts > 3 days, see a doctor immediately
- Stay hydrated, drink plenty of water
- Rest and avoid strenuous activity
- You can take paracetamol (per package instructions) if needed
- Monitor temperature regularly
- Seek immediate care if you have: severe headache, difficulty breathing, chest pain, or confusion",
            8,
        ),
        protocol(
            "Stomach Ache",
            "symptom",
            &["stomach", "tummy", "abdomen", "belly", "pain", "ache"],
            "For stomach discomfort:
- Eat light, bland foods (rice, banana, toast)
- Stay hydrated with water or ORS
- Avoid spicy, oily, or heavy foods
- Rest and don't eat for 2-3 hours if nauseous
- See a doctor if: severe pain, blood in stool, pain lasts > 2 days, or you have fever",
            7,
        ),
        protocol(
            "Headache",
            "symptom",
            &["headache", "head pain", "migraine"],
            "For headache relief:
- Rest in a quiet, dark room
- Stay hydrated
- Apply cold/warm compress to forehead
- Can take paracetamol if needed
- Avoid screens and bright lights
- Seek immediate care if: sudden severe headache, with fever and stiff neck, after head injury, or with vision changes",
            6,
        ),
        protocol(
            "Emergency Symptoms",
            "emergency",
            &["chest pain", "difficulty breathing", "unconscious", "bleeding", "severe"],
            "⚠️ This sounds like a medical emergency. Please seek immediate medical attention:
- Call emergency services (102/108) or go to nearest hospital
- Do NOT wait or try home remedies
- If chest pain: sit down, stay calm, take aspirin if available (unless allergic)
- If breathing difficulty: sit upright, stay calm, loosen tight clothing
- Have someone stay with you",
            10,
        ),
        protocol(
            "Refund Policy",
            "policy",
            &["refund", "money back", "cancel", "subscription"],
            "Our refund policy:
- You can cancel subscription anytime from settings
- Refunds available within 7 days of purchase
- Contact support@disha.health with your username
- Refunds processed within 5-7 business days
- For specific queries, I can connect you with our support team",
            5,
        ),
    ]
}
