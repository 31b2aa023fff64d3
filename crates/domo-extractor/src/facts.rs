//! Prompt construction and result parsing for the extraction batch.

use serde::Deserialize;
use tracing::warn;

use domo_state::models::{Conversation, Memory, MemoryType};

/// One fact proposed by the extraction model.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExtractedFact {
    pub text: String,
    pub memory_type: MemoryType,
    #[serde(default = "default_importance")]
    pub importance: u8,
}

fn default_importance() -> u8 {
    5
}

pub const EXTRACTION_INSTRUCTIONS: &str = "You extract durable facts about the USER \
from an assistant conversation. Focus on: stated facts, preferences, life events, \
and insights worth remembering across sessions. Skip small talk, tool output, and \
anything already in the known-facts list. Return ONLY a JSON array; each element: \
{\"text\": string, \"memory_type\": \"user_fact\"|\"preference\"|\"event\"|\"conversation_insight\", \
\"importance\": 1-10}. Return [] if nothing is worth keeping.";

/// Render the per-conversation user prompt.
pub fn build_prompt(conversation: &Conversation, existing: &[Memory]) -> String {
    let mut prompt = String::from("Known facts about this user:\n");
    if existing.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        for memory in existing {
            prompt.push_str(&format!("- [{:?}] {}\n", memory.memory_type, memory.text));
        }
    }
    prompt.push_str("\nConversation:\n");
    for turn in &conversation.messages {
        prompt.push_str(&format!("{}: {}\n", turn.role, turn.content));
    }
    prompt.push_str("\nExtract new facts as a JSON array.");
    prompt
}

/// Parse the model's output. The array may be wrapped in prose or a code
/// fence; anything unparseable yields an empty list with a warning.
pub fn parse_facts(raw: &str) -> Vec<ExtractedFact> {
    let trimmed = raw.trim();
    let json_slice = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(start), Some(end)) if end >= start => &trimmed[start..=end],
        _ => trimmed,
    };
    match serde_json::from_str::<Vec<ExtractedFact>>(json_slice) {
        Ok(facts) => facts
            .into_iter()
            .filter(|f| !f.text.trim().is_empty())
            .map(|mut f| {
                f.importance = f.importance.clamp(1, 10);
                f
            })
            .collect(),
        Err(e) => {
            warn!(error = %e, raw = %json_slice, "failed to parse extraction result");
            Vec::new()
        }
    }
}

/// What to do with one extracted fact given its best similarity match.
#[derive(Debug, PartialEq, Eq)]
pub enum DedupAction {
    /// No close match — store a new memory.
    Insert,
    /// Very close match — refresh the stored row instead of duplicating.
    Update { memory_id: i64 },
    /// Near-duplicate — drop the extracted fact.
    Skip,
}

pub fn decide_dedup(
    best_match: Option<(i64, f64)>,
    update_threshold: f64,
    dedup_threshold: f64,
) -> DedupAction {
    match best_match {
        Some((memory_id, similarity)) if similarity >= update_threshold => {
            DedupAction::Update { memory_id }
        }
        Some((_, similarity)) if similarity >= dedup_threshold => DedupAction::Skip,
        _ => DedupAction::Insert,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_array() {
        let facts = parse_facts(
            r#"[{"text":"lives in Lisbon","memory_type":"user_fact","importance":7}]"#,
        );
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].text, "lives in Lisbon");
        assert_eq!(facts[0].importance, 7);
    }

    #[test]
    fn parses_fenced_array_and_clamps_importance() {
        let raw = "Here you go:\n```json\n[{\"text\":\"x\",\"memory_type\":\"preference\",\"importance\":99}]\n```";
        let facts = parse_facts(raw);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].importance, 10);
    }

    #[test]
    fn garbage_and_empty_yield_nothing() {
        assert!(parse_facts("I could not find anything.").is_empty());
        assert!(parse_facts("[]").is_empty());
        assert!(parse_facts(r#"[{"text":"  ","memory_type":"event"}]"#).is_empty());
    }

    #[test]
    fn dedup_thresholds() {
        // 0.95 update / 0.85 dedup, per the default settings.
        assert_eq!(
            decide_dedup(Some((4, 0.97)), 0.95, 0.85),
            DedupAction::Update { memory_id: 4 }
        );
        assert_eq!(decide_dedup(Some((4, 0.90)), 0.95, 0.85), DedupAction::Skip);
        assert_eq!(decide_dedup(Some((4, 0.50)), 0.95, 0.85), DedupAction::Insert);
        assert_eq!(decide_dedup(None, 0.95, 0.85), DedupAction::Insert);
    }
}
