//! # opsloop core
//!
//! Domain types, traits, and error definitions for the opsloop agent.
//! This crate defines the model that all other crates implement against:
//! the six tool primitives and their call/result shapes, the per-request
//! state, the Planner/Responder output records, the tool catalogue, and the
//! provider seam.
//!
//! All other crates depend inward on this one.

pub mod call;
pub mod catalog;
pub mod chat;
pub mod error;
pub mod outcome;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use call::{ToolCall, ToolName};
pub use catalog::{catalog, render_catalog, ToolDescriptor};
pub use chat::{ChatMessage, ChatOutcome, ChatProvider, ChatRequest, ChatRole, ChatToolCall};
pub use error::{Error, MemoryError, ProviderError, Result, ToolError};
pub use outcome::{
    PlannerOutput, ResponderOutput, ToolResult, STOP_LOOP_DETECTED, STOP_PARSE_FAILED,
};
pub use state::{AgentState, LoopRecord};
