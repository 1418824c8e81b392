//! Model-to-context-window table. Falls back to 200k for any model not
//! explicitly listed, matching the conservative default Claude models carry.

const DEFAULT_WINDOW: u64 = 200_000;
pub const EXTENDED_WINDOW: u64 = 1_000_000;

const WINDOW_TABLE: &[(&str, u64)] = &[
    ("claude-opus-4-5", 200_000),
    ("claude-sonnet-4-5", 200_000),
    ("claude-haiku-4-5", 200_000),
    ("gpt-4o", 128_000),
    ("gpt-4.1", 1_000_000),
];

/// Models allowed to opt into the extended (1M token) context window.
const EXTENDED_ALLOW_LIST: &[&str] = &["claude-sonnet-4-5"];

pub fn standard_window(model: &str) -> u64 {
    WINDOW_TABLE
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, size)| *size)
        .unwrap_or(DEFAULT_WINDOW)
}

pub fn supports_extended(model: &str, operator_opted_in: bool) -> bool {
    operator_opted_in && EXTENDED_ALLOW_LIST.contains(&model)
}
