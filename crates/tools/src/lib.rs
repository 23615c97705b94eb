//! Tool execution for opsloop.
//!
//! The [`ToolRunner`] executes the six tool primitives — `list_dir`,
//! `read_file`, `write_file`, `edit_file`, `exec_cmd`, `grep` — with every
//! call passing through the security constraints and leaving one audit
//! entry. Failures become `ToolResult { success: false }`; nothing here
//! aborts the agent loop.

mod exec;
mod fs_ops;
mod runner;
mod search;

pub use runner::ToolRunner;

use opsloop_core::ToolError;
use opsloop_security::ConstraintError;

/// Raw output of one tool operation, before truncation and bookkeeping.
#[derive(Debug)]
pub(crate) struct RawOutput {
    pub output: String,
    pub exit_code: Option<i32>,
}

impl RawOutput {
    pub(crate) fn ok(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(0),
        }
    }
}

pub(crate) fn constraint_to_tool_error(err: ConstraintError) -> ToolError {
    match err {
        ConstraintError::PathOutsideRoot { path } => ToolError::PathForbidden(path),
        ConstraintError::CannotResolve { path, reason } => {
            ToolError::IoFailure(format!("{path}: {reason}"))
        }
        ConstraintError::CommandNotAllowed { command } => ToolError::CommandForbidden(command),
        ConstraintError::ShellMetacharacters { command } => {
            ToolError::CommandForbidden(format!("{command} (shell metacharacters)"))
        }
        ConstraintError::ExecDisabled => {
            ToolError::CommandForbidden("exec_cmd is disabled by configuration".into())
        }
    }
}

pub(crate) fn io_to_tool_error(path: &str, err: std::io::Error) -> ToolError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ToolError::NotFound(path.to_string())
    } else {
        ToolError::IoFailure(format!("{path}: {err}"))
    }
}
