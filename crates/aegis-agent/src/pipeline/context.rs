//! Shared context interface for the agent turn driver.
//!
//! `MessageContext` is a supertrait of `aegis_tools::ToolContext` — the same
//! struct that backs internal tool dispatch is handed straight to the turn
//! loop, rather than threading two separate context traits through
//! `pipeline::process`. The concrete implementation lives wherever the
//! caller wires up config, providers, and the supervisor (outside this
//! crate); this module only declares the contract.

use std::sync::Mutex as StdMutex;

use aegis_security::ToolDefinitionRegistry;
use aegis_tools::context::ToolContext;

use crate::runtime::AgentRuntime;

pub trait MessageContext: ToolContext {
    /// The LLM provider + prompt builder this context drives turns through.
    fn agent(&self) -> &AgentRuntime;

    /// Fingerprint registry used to detect tool-server "rug pulls" — a
    /// previously-approved tool's description or schema changing silently
    /// across a reconnect (spec §4.C). Long-lived across queries, unlike
    /// the per-query `aegis_context::ContextManager`.
    fn tool_definition_registry(&self) -> &StdMutex<ToolDefinitionRegistry>;

    /// Whether the operator has opted in to the extended context window
    /// (spec §4.D). Defaults to off.
    fn operator_opted_in_extended_context(&self) -> bool {
        false
    }

    /// Upper bound on turns per query (spec §4.F `max_turns`).
    fn max_turns(&self) -> usize {
        25
    }
}
