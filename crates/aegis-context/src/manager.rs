use tracing::{debug, warn};

use crate::types::{Exchange, ToolResultBlock, ToolRound, Usage};
use crate::window::{self, EXTENDED_WINDOW};

pub const DEFAULT_COMPACTION_THRESHOLD: usize = 8;
pub const DEFAULT_KEEP_RECENT: usize = 10;
pub const TRUNCATION_CAP: usize = 20_000;

const MASK_RATIO: f64 = 0.50;
const EXTENDED_ACTIVATE_RATIO: f64 = 0.75;
const EXTENDED_ACTIVATE_BASE: u64 = 200_000;
const BUDGET_WARNING_RATIO: f64 = 0.80;

/// Per-query derived state and policy decisions (spec §4.D). One instance
/// lives for the duration of a single query; `extended_active` is the only
/// field that carries state across calls within that lifetime.
pub struct ContextManager {
    model: String,
    operator_opted_in: bool,
    compaction_threshold: usize,
    keep_recent: usize,
    extended_active: bool,
}

impl ContextManager {
    pub fn new(model: impl Into<String>, operator_opted_in: bool) -> Self {
        Self {
            model: model.into(),
            operator_opted_in,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            keep_recent: DEFAULT_KEEP_RECENT,
            extended_active: false,
        }
    }

    pub fn with_thresholds(mut self, compaction_threshold: usize, keep_recent: usize) -> Self {
        self.compaction_threshold = compaction_threshold;
        self.keep_recent = keep_recent;
        self
    }

    pub fn extended_active(&self) -> bool {
        self.extended_active
    }

    fn current_window(&self) -> u64 {
        if self.extended_active {
            EXTENDED_WINDOW
        } else {
            window::standard_window(&self.model)
        }
    }

    /// `input > 0.50 × current_window` → caller should mask old observations
    /// before the next turn.
    pub fn should_mask_old_observations(&self, last_usage: &Usage) -> bool {
        (last_usage.input_tokens as f64) > MASK_RATIO * self.current_window() as f64
    }

    /// `input > 0.75 × 200k AND supports_extended AND not yet active` →
    /// activate the extended window for the rest of the query. Mutates
    /// `self.extended_active` and returns whether it just flipped on.
    pub fn should_activate_extended(&mut self, last_usage: &Usage) -> bool {
        if self.extended_active {
            return false;
        }
        let supports = window::supports_extended(&self.model, self.operator_opted_in);
        let should = supports
            && (last_usage.input_tokens as f64) > EXTENDED_ACTIVATE_RATIO * EXTENDED_ACTIVATE_BASE as f64;
        if should {
            self.extended_active = true;
            debug!(model = %self.model, "activating extended context window for this query");
        }
        should
    }

    /// `input > 0.80 × current_window` → log a visible budget warning.
    pub fn check_budget_warning(&self, last_usage: &Usage) {
        if (last_usage.input_tokens as f64) > BUDGET_WARNING_RATIO * self.current_window() as f64 {
            warn!(
                input_tokens = last_usage.input_tokens,
                window = self.current_window(),
                "context budget warning: approaching window limit"
            );
        }
    }

    /// `exchanges ≥ compaction_threshold` → compaction should run between
    /// queries. Skipped when `exchanges ≤ keep_recent` (nothing to compact).
    pub fn should_compact(&self, exchange_count: usize) -> bool {
        exchange_count >= self.compaction_threshold && exchange_count > self.keep_recent
    }

    pub fn keep_recent(&self) -> usize {
        self.keep_recent
    }
}

/// Hard-truncate a tool result exceeding [`TRUNCATION_CAP`] characters,
/// appending a trailing marker noting the original length.
pub fn truncate_tool_result(text: &str) -> String {
    if text.chars().count() <= TRUNCATION_CAP {
        return text.to_string();
    }
    let original_len = text.chars().count();
    let truncated: String = text.chars().take(TRUNCATION_CAP).collect();
    format!("{truncated}\n\n[truncated: original length {original_len} characters]")
}

/// Mask tool_result content in every round older than the most recent
/// `keep_recent` rounds, preserving each block's correlation id.
pub fn mask_old_observations(rounds: &mut [ToolRound], keep_recent: usize) {
    let total = rounds.len();
    if total <= keep_recent {
        return;
    }
    let cutoff = total - keep_recent;
    for round in rounds.iter_mut().take(cutoff) {
        for block in round.iter_mut() {
            block.content = "[Result already retrieved]".to_string();
        }
    }
}

/// Build the synthetic exchange that replaces a compacted batch of old
/// exchanges, given a `summary` produced by the chat backend.
pub fn synthetic_summary_exchange(summary: String) -> Exchange {
    Exchange {
        user: "[Conversation summary]".to_string(),
        assistant: summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input_tokens: u64) -> Usage {
        Usage {
            input_tokens,
            output_tokens: 0,
            cache_creation: None,
            cache_read: None,
        }
    }

    #[test]
    fn masking_threshold_at_50_percent() {
        let cm = ContextManager::new("claude-sonnet-4-5", false);
        assert!(!cm.should_mask_old_observations(&usage(99_999)));
        assert!(cm.should_mask_old_observations(&usage(100_001)));
    }

    #[test]
    fn extended_activation_requires_opt_in_and_allow_listed_model() {
        let mut cm = ContextManager::new("claude-sonnet-4-5", false);
        assert!(!cm.should_activate_extended(&usage(160_000)));

        let mut cm = ContextManager::new("claude-sonnet-4-5", true);
        assert!(cm.should_activate_extended(&usage(160_000)));
        assert!(cm.extended_active());
        // already active: does not re-fire
        assert!(!cm.should_activate_extended(&usage(900_000)));
    }

    #[test]
    fn extended_activation_rejects_non_allow_listed_model() {
        let mut cm = ContextManager::new("gpt-4o", true);
        assert!(!cm.should_activate_extended(&usage(160_000)));
    }

    #[test]
    fn compaction_requires_exceeding_both_threshold_and_keep_recent() {
        let cm = ContextManager::new("claude-sonnet-4-5", false);
        // threshold (8) is met but keep_recent (10) guard blocks it
        assert!(!cm.should_compact(8));
        assert!(!cm.should_compact(10));
        assert!(cm.should_compact(11));
    }

    #[test]
    fn tool_result_truncation_caps_at_20000_chars() {
        let long = "x".repeat(25_000);
        let truncated = truncate_tool_result(&long);
        assert!(truncated.starts_with(&"x".repeat(100)));
        assert!(truncated.contains("original length 25000"));
        assert!(truncated.len() < long.len());
    }

    #[test]
    fn short_tool_result_is_untouched() {
        let short = "ok".to_string();
        assert_eq!(truncate_tool_result(&short), short);
    }

    #[test]
    fn observation_masking_preserves_recent_and_blanks_old() {
        let mut rounds: Vec<ToolRound> = (0..12)
            .map(|i| {
                vec![ToolResultBlock {
                    id: format!("call_{i}"),
                    content: format!("result {i}"),
                }]
            })
            .collect();
        mask_old_observations(&mut rounds, 10);

        // first two rounds (oldest) masked
        assert_eq!(rounds[0][0].content, "[Result already retrieved]");
        assert_eq!(rounds[1][0].content, "[Result already retrieved]");
        assert_eq!(rounds[0][0].id, "call_0");

        // most recent 10 rounds untouched
        for round in &rounds[2..] {
            assert!(!round[0].content.starts_with("[Result"));
        }
    }
}
