//! The opsloop agent — Planner, Responder, and the loop controller.
//!
//! One request runs as a bounded loop of **Plan → Execute → Respond**:
//!
//! 1. The [`planner::Planner`] decides which tools to call (or that none are
//!    needed), as strict JSON over either the structured-tool channel or a
//!    text protocol.
//! 2. The tool runner executes the calls under the security envelope.
//! 3. The [`responder::Responder`] explains the results and flags whether
//!    the answer is final.
//!
//! The [`loop_runner::AgentLoop`] coordinates the three stages, applies the
//! termination rules, and synthesises a closing summary when the loop budget
//! runs out.

pub mod extract;
pub mod loop_runner;
pub mod planner;
pub mod responder;

pub use loop_runner::{AgentLoop, RunReport};
pub use planner::Planner;
pub use responder::Responder;
