//! Keyword extraction and KG-derived system prompt sections (spec §4.F
//! "Learnings injection" / "Auto-context injection"). Reads entities the
//! same way `aegis_tools::knowledge` renders them for `search_knowledge`,
//! since both present the same bi-temporal `Entity.data` shape to a model.

use aegis_kg::{Entity, KnowledgeGraph};

const MAX_KEYWORDS: usize = 5;
const CONFIDENCE_FLOOR: f64 = 0.5;
const MAX_PER_CATEGORY: usize = 5;
const LEARNINGS_SECTION_CAP: usize = 1500;
const AUTO_CONTEXT_CAP: usize = 5;

const STOP_WORDS: &[&str] = &[
    "about", "after", "again", "also", "been", "being", "between", "could", "does", "doing", "each", "from", "have",
    "here", "into", "just", "like", "more", "most", "only", "other", "over", "same", "should", "some", "such",
    "than", "that", "their", "them", "then", "there", "these", "they", "this", "those", "through", "very", "want",
    "what", "when", "where", "which", "while", "with", "would", "your",
];

/// Extract up to [`MAX_KEYWORDS`] significant keywords from user text:
/// lowercase tokens of at least 4 characters, excluding stop words, in
/// first-seen order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut keywords = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
        let word = raw.to_lowercase();
        if word.chars().count() < 4 || STOP_WORDS.contains(&word.as_str()) {
            continue;
        }
        if seen.insert(word.clone()) {
            keywords.push(word);
        }
    }
    keywords
}

fn entity_content(entity: &Entity) -> &str {
    entity.data.get("content").and_then(|v| v.as_str()).unwrap_or("")
}

fn entity_confidence(entity: &Entity) -> f64 {
    entity.data.get("confidence").and_then(|v| v.as_f64()).unwrap_or(1.0)
}

/// Matches against `content` when present (the knowledge-entity shape);
/// otherwise against the whole rendered `data` blob, since auto-context
/// entities (tickets, jobs, components, ...) have no fixed schema.
fn matches_any_keyword(entity: &Entity, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let rendered = match entity.data.get("content").and_then(|v| v.as_str()) {
        Some(content) => content.to_lowercase(),
        None => entity.data.to_string().to_lowercase(),
    };
    keywords.iter().any(|k| rendered.contains(k.as_str()))
}

/// Render the "What You Know" section: all `user_preference` entities above
/// the confidence floor, plus keyword-matching `lesson_learned`,
/// `project_context`, and `decision_rationale` entities, capped in total
/// length.
pub fn learnings_section(kg: &KnowledgeGraph, keywords: &[String]) -> Option<String> {
    let mut entries: Vec<String> = Vec::new();

    if let Ok(preferences) = kg.search_knowledge("", 200) {
        for entity in preferences.iter().filter(|e| e.entity_type == "user_preference") {
            if entity_confidence(entity) >= CONFIDENCE_FLOOR {
                entries.push(render_learning(entity));
            }
        }
    }

    for category in ["lesson_learned", "project_context", "decision_rationale"] {
        let Ok(candidates) = kg.search_knowledge("", 200) else { continue };
        let mut matched: Vec<&Entity> = candidates
            .iter()
            .filter(|e| e.entity_type == category)
            .filter(|e| entity_confidence(e) >= CONFIDENCE_FLOOR)
            .filter(|e| matches_any_keyword(e, keywords))
            .collect();
        matched.sort_by(|a, b| b.tx_from.cmp(&a.tx_from));
        for entity in matched.into_iter().take(MAX_PER_CATEGORY) {
            entries.push(render_learning(entity));
        }
    }

    if entries.is_empty() {
        return None;
    }

    let mut out = String::from("## What You Know\n");
    for entry in entries {
        if out.len() + entry.len() > LEARNINGS_SECTION_CAP {
            break;
        }
        out.push_str(&entry);
        out.push('\n');
    }
    Some(out)
}

fn render_learning(entity: &Entity) -> String {
    format!("- [{}] {}", entity.entity_type, entity_content(entity))
}

/// Render the "Relevant Context" section: current-belief entities of
/// non-knowledge types whose content matches a query keyword, deduped by
/// id, capped at [`AUTO_CONTEXT_CAP`].
pub fn auto_context_section(kg: &KnowledgeGraph, keywords: &[String]) -> Option<String> {
    if keywords.is_empty() {
        return None;
    }
    const KNOWLEDGE_TYPES: &[&str] = &["user_preference", "lesson_learned", "project_context", "decision_rationale"];
    let Ok(candidates) = kg.search_knowledge("", 500) else { return None };

    let mut seen = std::collections::HashSet::new();
    let mut entries: Vec<String> = Vec::new();
    for entity in &candidates {
        if entries.len() >= AUTO_CONTEXT_CAP {
            break;
        }
        if KNOWLEDGE_TYPES.contains(&entity.entity_type.as_str()) {
            continue;
        }
        if !matches_any_keyword(entity, keywords) {
            continue;
        }
        if !seen.insert(entity.id.clone()) {
            continue;
        }
        let rendered = match entity.data.get("content").and_then(|v| v.as_str()) {
            Some(content) => content.to_string(),
            None => entity.data.to_string(),
        };
        entries.push(format!("- [{}:{}] {}", entity.entity_type, entity.id, rendered));
    }

    if entries.is_empty() {
        return None;
    }
    let mut out = String::from("## Relevant Context\n");
    for entry in entries {
        out.push_str(&entry);
        out.push('\n');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_extraction_drops_short_and_stop_words() {
        let keywords = extract_keywords("What is the status of the deployment pipeline?");
        assert!(keywords.contains(&"status".to_string()));
        assert!(keywords.contains(&"deployment".to_string()));
        assert!(keywords.contains(&"pipeline".to_string()));
        assert!(!keywords.contains(&"what".to_string()));
        assert!(!keywords.contains(&"the".to_string()));
    }

    #[test]
    fn keyword_extraction_caps_at_five_and_dedupes() {
        let keywords = extract_keywords("alpha alpha beta gamma delta epsilon zeta");
        assert_eq!(keywords.len(), MAX_KEYWORDS);
        assert_eq!(keywords.iter().filter(|k| *k == "alpha").count(), 1);
    }

    #[test]
    fn learnings_section_includes_preferences_regardless_of_keywords() {
        let kg = KnowledgeGraph::open_in_memory().unwrap();
        kg.insert_entity(
            "user_preference",
            "user_preference:tone",
            chrono::Utc::now(),
            None,
            serde_json::json!({"content": "prefers terse answers", "confidence": 0.9}),
        )
        .unwrap();

        let section = learnings_section(&kg, &[]).expect("should render");
        assert!(section.contains("prefers terse answers"));
    }

    #[test]
    fn learnings_section_filters_lessons_by_keyword_and_confidence() {
        let kg = KnowledgeGraph::open_in_memory().unwrap();
        kg.insert_entity(
            "lesson_learned",
            "lesson_learned:deploy",
            chrono::Utc::now(),
            None,
            serde_json::json!({"content": "deployment requires a staging soak", "confidence": 0.8}),
        )
        .unwrap();
        kg.insert_entity(
            "lesson_learned",
            "lesson_learned:unrelated",
            chrono::Utc::now(),
            None,
            serde_json::json!({"content": "coffee tastes better fresh", "confidence": 0.8}),
        )
        .unwrap();

        let section = learnings_section(&kg, &["deployment".to_string()]).expect("should render");
        assert!(section.contains("staging soak"));
        assert!(!section.contains("coffee"));
    }

    #[test]
    fn auto_context_skips_knowledge_types() {
        let kg = KnowledgeGraph::open_in_memory().unwrap();
        kg.insert_entity(
            "ticket",
            "ticket:OPS-42",
            chrono::Utc::now(),
            None,
            serde_json::json!({"content": "deployment pipeline is stuck"}),
        )
        .unwrap();
        kg.insert_entity(
            "user_preference",
            "user_preference:tone",
            chrono::Utc::now(),
            None,
            serde_json::json!({"content": "deployment preferences noted"}),
        )
        .unwrap();

        let section = auto_context_section(&kg, &["deployment".to_string()]).expect("should render");
        assert!(section.contains("OPS-42"));
        assert!(!section.contains("user_preference:tone"));
    }
}
