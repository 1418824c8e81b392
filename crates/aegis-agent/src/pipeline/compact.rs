//! Between-query compaction (spec §4.D): once a conversation's exchange
//! count passes the compaction threshold, the oldest batch is summarized by
//! a cheap model call and replaced with one synthetic exchange, keeping the
//! most recent exchanges verbatim. Grounded on the teacher's
//! `pipeline::compact::compact_session_if_needed`'s shape (threshold check →
//! cheap-model extraction call → replace old turns), generalized from the
//! teacher's SQLite-backed fact-extraction-into-`user_memory` design to
//! `aegis-context`'s in-memory `Exchange` list and summary-exchange model.

use aegis_context::{synthetic_summary_exchange, ContextManager, Exchange};
use tracing::{info, warn};

use crate::provider::{ChatRequest, Message, Role};
use crate::runtime::AgentRuntime;

const COMPACTION_MODEL: &str = "claude-haiku-4-5-20251001";
const SUMMARY_MAX_TOKENS: u32 = 1024;

/// Compact `exchanges` in place if the conversation has grown past the
/// compaction threshold, returning the (possibly shortened) replacement
/// list. The caller is responsible for persisting whatever comes back.
pub async fn compact_if_needed(agent: &AgentRuntime, model: &str, exchanges: Vec<Exchange>) -> Vec<Exchange> {
    let cm = ContextManager::new(model.to_string(), false);
    if !cm.should_compact(exchanges.len()) {
        return exchanges;
    }

    let keep_recent = cm.keep_recent();
    let split = exchanges.len() - keep_recent;
    let (old, recent) = exchanges.split_at(split);

    info!(old_count = old.len(), keep_recent, "compacting oldest exchanges into a summary");

    let transcript: String = old
        .iter()
        .map(|e| format!("USER: {}\n\nASSISTANT: {}", e.user, e.assistant))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let req = ChatRequest {
        model: COMPACTION_MODEL.to_string(),
        system: "You summarize conversation history for long-term memory. Produce a dense, \
                 factual paragraph covering what was discussed, decided, or learned. Omit \
                 pleasantries and tool-call mechanics; keep names, numbers, and decisions exact."
            .to_string(),
        system_prompt: None,
        messages: vec![Message { role: Role::User, content: format!("Summarize this conversation:\n\n{transcript}") }],
        max_tokens: SUMMARY_MAX_TOKENS,
        stream: false,
        tools: Vec::new(),
        raw_messages: None,
    };

    let summary = match agent.provider().send(&req).await {
        Ok(response) => response.content,
        Err(e) => {
            warn!(error = %e, "compaction summarization call failed, keeping full history uncompacted");
            return exchanges;
        }
    };

    let mut compacted = Vec::with_capacity(1 + recent.len());
    compacted.push(synthetic_summary_exchange(summary));
    compacted.extend(recent.iter().cloned());
    compacted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(user: &str, assistant: &str) -> Exchange {
        Exchange { user: user.to_string(), assistant: assistant.to_string() }
    }

    #[test]
    fn below_threshold_is_a_no_op_without_a_provider_call() {
        let cm = ContextManager::new("claude-sonnet-4-5", false);
        let exchanges: Vec<Exchange> = (0..5).map(|i| exchange(&format!("q{i}"), &format!("a{i}"))).collect();
        assert!(!cm.should_compact(exchanges.len()));
    }

    #[test]
    fn above_threshold_splits_at_keep_recent() {
        let cm = ContextManager::new("claude-sonnet-4-5", false);
        let exchanges: Vec<Exchange> = (0..15).map(|i| exchange(&format!("q{i}"), &format!("a{i}"))).collect();
        assert!(cm.should_compact(exchanges.len()));
        let split = exchanges.len() - cm.keep_recent();
        assert_eq!(split, 5);
    }
}
