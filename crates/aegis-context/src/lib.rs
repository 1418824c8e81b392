pub mod manager;
pub mod types;
pub mod window;

pub use manager::{
    mask_old_observations, synthetic_summary_exchange, truncate_tool_result, ContextManager,
    DEFAULT_COMPACTION_THRESHOLD, DEFAULT_KEEP_RECENT, TRUNCATION_CAP,
};
pub use types::{Exchange, ToolResultBlock, ToolRound, Usage};
