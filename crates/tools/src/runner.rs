//! The tool runner — dispatches validated tool calls and assembles results.
//!
//! Execution protocol, for every call:
//! 1. Validate path/command arguments against the constraints.
//! 2. Run the operation inside the effective timeout.
//! 3. Truncate the combined output to the configured cap.
//! 4. Record duration, exit code and success, and emit one audit entry.

use crate::{exec, fs_ops, search, RawOutput};
use chrono::Utc;
use opsloop_core::{ToolCall, ToolError, ToolResult};
use opsloop_security::{AuditEntry, AuditLog, Constraints};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub struct ToolRunner {
    constraints: Arc<Constraints>,
    audit: Arc<AuditLog>,
}

impl ToolRunner {
    pub fn new(constraints: Arc<Constraints>, audit: Arc<AuditLog>) -> Self {
        Self { constraints, audit }
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Execute a batch sequentially, in the order the Planner emitted it.
    /// Sequential execution keeps the audit log in call order.
    pub async fn execute_batch(&self, calls: &[ToolCall], loop_id: u32) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call, loop_id).await);
        }
        results
    }

    /// Execute a single call. Never returns an error: every failure becomes
    /// a `ToolResult { success: false }` for the Responder to explain.
    pub async fn execute(&self, call: &ToolCall, loop_id: u32) -> ToolResult {
        let tool_name = call.name();
        let args_echo = call.args_value();
        debug!(tool = %tool_name, loop_id, "Executing tool call");

        let started = Instant::now();
        let outcome = self.dispatch(call).await;
        let duration_sec = started.elapsed().as_secs_f64();

        let result = match outcome {
            Ok(raw) => {
                let output_length = raw.output.chars().count();
                let output = self.constraints.truncate_output(&raw.output);
                let success = raw.exit_code.map_or(true, |code| code == 0);
                let error = match raw.exit_code {
                    Some(code) if code != 0 => format!("exit code {code}"),
                    _ => String::new(),
                };
                ToolResult {
                    tool_name,
                    args_echo: args_echo.clone(),
                    success,
                    output,
                    error,
                    exit_code: raw.exit_code,
                    duration_sec,
                    output_length,
                }
            }
            Err(err) => {
                warn!(tool = %tool_name, error = %err, "Tool call failed");
                let exit_code = match &err {
                    ToolError::Timeout { .. } => Some(124),
                    _ => None,
                };
                ToolResult {
                    tool_name,
                    args_echo: args_echo.clone(),
                    success: false,
                    output: String::new(),
                    error: err.to_string(),
                    exit_code,
                    duration_sec,
                    output_length: 0,
                }
            }
        };

        self.audit.record_tool_call(AuditEntry {
            timestamp: Utc::now(),
            loop_id,
            tool_name: tool_name.to_string(),
            args: args_echo,
            success: result.success,
            exit_code: result.exit_code,
            duration_sec: result.duration_sec,
            output_length: result.output_length,
        });

        result
    }

    async fn dispatch(&self, call: &ToolCall) -> Result<RawOutput, ToolError> {
        match call {
            ToolCall::ListDir { path } => {
                self.bounded(fs_ops::list_dir(&self.constraints, path)).await
            }
            ToolCall::ReadFile {
                path,
                offset,
                limit,
            } => {
                self.bounded(fs_ops::read_file(&self.constraints, path, *offset, *limit))
                    .await
            }
            ToolCall::WriteFile { path, content } => {
                self.bounded(fs_ops::write_file(&self.constraints, path, content))
                    .await
            }
            ToolCall::EditFile {
                path,
                old_text,
                new_text,
            } => {
                self.bounded(fs_ops::edit_file(&self.constraints, path, old_text, new_text))
                    .await
            }
            // exec_cmd manages its own timeout so it can kill the process group
            ToolCall::ExecCmd { command, timeout } => {
                exec::exec_cmd(&self.constraints, command, *timeout).await
            }
            ToolCall::Grep { pattern, path } => {
                self.bounded(search::grep(&self.constraints, pattern, path))
                    .await
            }
        }
    }

    /// Run a filesystem operation under the configured timeout cap.
    async fn bounded<F>(&self, op: F) -> Result<RawOutput, ToolError>
    where
        F: std::future::Future<Output = Result<RawOutput, ToolError>>,
    {
        let seconds = self.constraints.effective_timeout(None);
        match tokio::time::timeout(Duration::from_secs(seconds), op).await {
            Ok(result) => result,
            Err(_) => Err(ToolError::Timeout { seconds }),
        }
    }
}
