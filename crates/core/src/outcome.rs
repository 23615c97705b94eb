//! Tool result and LLM output types.

use crate::call::{ToolCall, ToolName};
use serde::{Deserialize, Serialize};

/// The structured result of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: ToolName,

    /// The arguments the tool was invoked with, echoed back verbatim.
    pub args_echo: serde_json::Value,

    pub success: bool,

    /// Combined output, already truncated to the configured cap.
    pub output: String,

    /// One-line diagnostic when the call failed.
    pub error: String,

    /// Process exit code, where one exists (`exec_cmd` only).
    pub exit_code: Option<i32>,

    pub duration_sec: f64,

    /// Length in characters of the output before truncation.
    pub output_length: usize,
}

impl ToolResult {
    /// A failed result carrying a diagnostic. Invariant: a failure always
    /// populates `error` or a non-zero `exit_code`.
    pub fn failure(call: &ToolCall, error: impl Into<String>, duration_sec: f64) -> Self {
        Self {
            tool_name: call.name(),
            args_echo: call.args_value(),
            success: false,
            output: String::new(),
            error: error.into(),
            exit_code: None,
            duration_sec,
            output_length: 0,
        }
    }

    /// One-line rendering with a bounded output preview, for prompts.
    pub fn summary_line(&self, preview_chars: usize) -> String {
        let mark = if self.success { "ok" } else { "err" };
        if !self.error.is_empty() {
            format!("{} [{}] {}", self.tool_name, mark, self.error)
        } else {
            let preview: String = self
                .output
                .chars()
                .take(preview_chars)
                .map(|c| if c == '\n' { ' ' } else { c })
                .collect();
            format!("{} [{}] {}", self.tool_name, mark, preview)
        }
    }
}

/// Output of one Planner call: what to execute next, plus optional deltas to
/// the conversation state. The Planner is the authoritative source of task
/// deltas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlannerOutput {
    pub need_tools: bool,

    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default)]
    pub reason_brief: String,

    #[serde(default)]
    pub stop_condition: String,

    #[serde(default)]
    pub new_facts: Vec<String>,

    #[serde(default)]
    pub resolved_tasks: Vec<String>,

    #[serde(default)]
    pub added_tasks: Vec<String>,
}

/// `stop_condition` value when the Planner output could not be parsed.
pub const STOP_PARSE_FAILED: &str = "parse_failed";
/// `stop_condition` value when identical tool calls keep repeating.
pub const STOP_LOOP_DETECTED: &str = "loop_detected";

impl PlannerOutput {
    /// Degenerate output used when neither JSON nor `TOOL_CALL:` blocks could
    /// be extracted. The raw response is preserved so the Responder can still
    /// relay something useful.
    pub fn parse_failed(raw_response: &str) -> Self {
        Self {
            need_tools: false,
            reason_brief: raw_response.to_string(),
            stop_condition: STOP_PARSE_FAILED.into(),
            ..Self::default()
        }
    }

    /// Synthesised output when identical calls with identical results keep
    /// repeating across loops.
    pub fn loop_detected() -> Self {
        Self {
            need_tools: false,
            reason_brief: "identical tool calls repeating with identical results".into(),
            stop_condition: STOP_LOOP_DETECTED.into(),
            ..Self::default()
        }
    }
}

/// Output of one Responder call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponderOutput {
    /// The natural-language reply. Non-empty whenever the Responder ran.
    pub response: String,

    /// Brief summary of what was executed.
    pub summary: String,

    /// What should happen next, when the goal is unmet.
    pub next_action: String,

    pub is_final_answer: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_populates_error() {
        let call = ToolCall::ReadFile {
            path: "missing.txt".into(),
            offset: 0,
            limit: None,
        };
        let result = ToolResult::failure(&call, "not found: missing.txt", 0.01);
        assert!(!result.success);
        assert!(!result.error.is_empty() || result.exit_code.map_or(false, |c| c != 0));
        assert_eq!(result.args_echo["path"], "missing.txt");
    }

    #[test]
    fn summary_line_flattens_newlines() {
        let result = ToolResult {
            tool_name: ToolName::ListDir,
            args_echo: serde_json::json!({"path": "."}),
            success: true,
            output: "a\nb\nc".into(),
            error: String::new(),
            exit_code: Some(0),
            duration_sec: 0.0,
            output_length: 5,
        };
        let line = result.summary_line(80);
        assert!(line.contains("a b c"));
        assert!(line.contains("ok"));
    }

    #[test]
    fn parse_failed_output_carries_raw_response() {
        let out = PlannerOutput::parse_failed("I am not JSON");
        assert!(!out.need_tools);
        assert!(out.tool_calls.is_empty());
        assert_eq!(out.reason_brief, "I am not JSON");
        assert_eq!(out.stop_condition, STOP_PARSE_FAILED);
    }

    #[test]
    fn tool_result_serde_round_trip() {
        let result = ToolResult {
            tool_name: ToolName::ExecCmd,
            args_echo: serde_json::json!({"command": "ls"}),
            success: false,
            output: String::new(),
            error: "timeout".into(),
            exit_code: Some(124),
            duration_sec: 2.01,
            output_length: 0,
        };
        let json = serde_json::to_string(&result).unwrap();
        let back: ToolResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.exit_code, Some(124));
        assert_eq!(back.error, "timeout");
    }
}
