//! `aegis-agent` — the turn-taking driver: LLM providers, the tiered system
//! prompt, and the agent loop that ties tool dispatch, context budgeting,
//! and security sanitization together into one conversational turn (spec
//! §4.F).
//!
//! Grounding: `skynet-agent::{provider,anthropic,openai,runtime,prompt,
//! tools::tool_loop}` generalized to two providers, a richer per-query
//! policy loop (dedup caching, loop detection, nudges, cancellation), and
//! the spec's collaborator set (`aegis-context`, `aegis-security`,
//! `aegis-kg`, `aegis-supervisor`, `aegis-tools`) in place of the teacher's
//! flat memory/hooks stack.

pub mod anthropic;
pub mod anthropic_stream;
pub mod openai;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod runtime;
pub mod stream;

pub use pipeline::{
    compact_if_needed, process_message_non_streaming, process_message_streaming, process_raw_messages_non_streaming,
    process_raw_messages_streaming, MessageContext, ProcessedMessage,
};
pub use prompt::{PromptBuilder, SessionInfo, SystemPrompt};
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, ToolCall, ToolDefinition};
pub use runtime::AgentRuntime;
pub use stream::StreamEvent;
