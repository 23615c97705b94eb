//! Security envelope for opsloop.
//!
//! Two concerns live here:
//! - [`constraints`] — the pure validators every tool call passes through:
//!   path confinement, command allowlisting, timeout caps, and output
//!   truncation.
//! - [`audit`] — the append-only JSONL record of every tool invocation.

pub mod audit;
pub mod constraints;

pub use audit::{AuditEntry, AuditLog, PerToolStats, ToolCallSummary};
pub use constraints::{truncate_output, ConstraintError, Constraints};
