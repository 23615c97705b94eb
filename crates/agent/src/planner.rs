//! The Planner — first LLM call of each loop.
//!
//! Decides whether tools are needed and which calls to make, as strict JSON.
//! Accepts either a structured function-calling response or text carrying
//! JSON; falls back to `TOOL_CALL:` blocks, and degrades to a
//! `parse_failed` output when nothing can be extracted. Unknown tool names
//! are dropped and logged, never executed.

use crate::extract::{extract_first_json, extract_tool_call_blocks};
use opsloop_core::{
    catalog, render_catalog, AgentState, ChatMessage, ChatOutcome, ChatProvider, ChatRequest,
    ChatToolCall, Error, PlannerOutput, ToolCall,
};
use opsloop_memory::MemorySnapshot;
use opsloop_security::AuditLog;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const PLANNER_INSTRUCTIONS: &str = r#"You are the planning stage of an OS automation agent.

Decide what tools to call next based on:
1. The user's request
2. Long-term memory (preferences, environment, decisions)
3. The current state (facts gathered, tasks remaining, loop history)

Output MUST be valid JSON with this exact structure:
{
  "need_tools": boolean,
  "tool_calls": [
    {"tool_name": "...", "args": {...}}
  ],
  "reason_brief": "string (max 300 chars)",
  "stop_condition": "string - what signals completion?",
  "new_facts": ["optional: facts discovered"],
  "resolved_tasks": ["optional: tasks now complete"],
  "added_tasks": ["optional: new subgoals"]
}

RULES:
1. If no tools are needed (e.g. the answer is already known), set need_tools=false and leave tool_calls empty
2. Only call tools from the list below
3. Check the loop history; never repeat a call that already produced the same result
4. Be concise in reason_brief
5. Output valid JSON only, with no explanation outside it"#;

/// How many identical call/result pairs count as a livelock.
const LIVELOCK_REPEATS: usize = 3;

pub struct Planner {
    provider: Arc<dyn ChatProvider>,
    enable_function_calling: bool,
    max_loops: u32,
}

/// Loose deserialization target for the Planner's JSON. Tool calls stay as
/// raw values so one malformed call does not sink the batch.
#[derive(Deserialize)]
struct RawPlan {
    need_tools: bool,
    #[serde(default)]
    tool_calls: Vec<serde_json::Value>,
    #[serde(default)]
    reason_brief: String,
    #[serde(default)]
    stop_condition: String,
    #[serde(default)]
    new_facts: Vec<String>,
    #[serde(default)]
    resolved_tasks: Vec<String>,
    #[serde(default)]
    added_tasks: Vec<String>,
}

impl Planner {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        enable_function_calling: bool,
        max_loops: u32,
    ) -> Self {
        Self {
            provider,
            enable_function_calling,
            max_loops,
        }
    }

    /// Produce the plan for the current loop.
    pub async fn plan(
        &self,
        request: &str,
        memory: &MemorySnapshot,
        state: &AgentState,
        audit: &AuditLog,
    ) -> Result<PlannerOutput, Error> {
        let loop_id = state.loop_count;

        // Livelock guard: identical calls with identical results keep coming
        // back, so stop asking for tools at all.
        if Self::detect_livelock(state) {
            warn!(loop_id, "Loop detected, stopping tool use");
            let output = PlannerOutput::loop_detected();
            audit.record_planner_decision(loop_id, false, 0, &output.reason_brief);
            return Ok(output);
        }

        let system = self.build_system_prompt(memory, state);
        let mut user = request.to_string();
        if loop_id > 1 {
            user.push_str("\n\n");
            user.push_str(&state.history_summary(3));
        }

        let tools = if self.enable_function_calling {
            Some(catalog())
        } else {
            None
        };

        let outcome = self
            .provider
            .complete(ChatRequest {
                messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
                tools,
            })
            .await
            .map_err(|e| {
                audit.record_error(loop_id, "PlannerLLMError", &e.to_string());
                Error::Provider(e)
            })?;

        let output = Self::interpret(&outcome);
        if Self::repeats_previous_batch(state, &output.tool_calls) {
            warn!(loop_id, "Planner repeated the previous loop's batch verbatim");
        }
        debug!(
            loop_id,
            need_tools = output.need_tools,
            tool_count = output.tool_calls.len(),
            stop_condition = %output.stop_condition,
            "Planner decision"
        );
        audit.record_planner_decision(
            loop_id,
            output.need_tools,
            output.tool_calls.len(),
            &output.reason_brief,
        );
        Ok(output)
    }

    /// Interpret a provider response: structured tool calls take precedence,
    /// then JSON in the text, then `TOOL_CALL:` blocks, then the degenerate
    /// parse-failed output.
    fn interpret(outcome: &ChatOutcome) -> PlannerOutput {
        if !outcome.tool_calls.is_empty() {
            if let Some(output) = Self::from_structured(&outcome.tool_calls) {
                return output;
            }
        }
        Self::parse_text(&outcome.content)
    }

    /// Map structured function-calling output directly onto tool calls.
    fn from_structured(calls: &[ChatToolCall]) -> Option<PlannerOutput> {
        let mut tool_calls = Vec::new();
        for call in calls {
            let args: serde_json::Value = match serde_json::from_str(&call.arguments) {
                Ok(v) => v,
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Dropping tool call with unparseable arguments");
                    continue;
                }
            };
            match Self::validate_call(&call.name, args) {
                Some(tc) => tool_calls.push(tc),
                None => continue,
            }
        }

        if tool_calls.is_empty() {
            return None;
        }
        Some(PlannerOutput {
            need_tools: true,
            tool_calls,
            ..Default::default()
        })
    }

    /// Parse a textual response.
    fn parse_text(text: &str) -> PlannerOutput {
        if let Some(json) = extract_first_json(text) {
            if let Ok(raw) = serde_json::from_str::<RawPlan>(json) {
                return Self::from_raw_plan(raw);
            }
        }

        // Fall back to the textual tool-call protocol
        let mut tool_calls = Vec::new();
        for block in extract_tool_call_blocks(text) {
            let Ok(value) = serde_json::from_str::<serde_json::Value>(block) else {
                continue;
            };
            let Some(name) = value.get("name").and_then(|n| n.as_str()) else {
                continue;
            };
            let args = value.get("args").cloned().unwrap_or(serde_json::json!({}));
            if let Some(tc) = Self::validate_call(name, args) {
                tool_calls.push(tc);
            }
        }
        if !tool_calls.is_empty() {
            return PlannerOutput {
                need_tools: true,
                tool_calls,
                ..Default::default()
            };
        }

        PlannerOutput::parse_failed(text)
    }

    fn from_raw_plan(raw: RawPlan) -> PlannerOutput {
        let mut tool_calls = Vec::new();
        if raw.need_tools {
            for value in raw.tool_calls {
                let Some(name) = value.get("tool_name").and_then(|n| n.as_str()) else {
                    warn!("Dropping tool call without tool_name");
                    continue;
                };
                let args = value.get("args").cloned().unwrap_or(serde_json::json!({}));
                if let Some(tc) = Self::validate_call(name, args) {
                    tool_calls.push(tc);
                }
            }
        }

        let need_tools = raw.need_tools && !tool_calls.is_empty();
        let mut reason = raw.reason_brief;
        if reason.chars().count() > 300 {
            reason = reason.chars().take(300).collect();
        }

        PlannerOutput {
            need_tools,
            tool_calls,
            reason_brief: reason,
            stop_condition: raw.stop_condition,
            new_facts: raw.new_facts,
            resolved_tasks: raw.resolved_tasks,
            added_tasks: raw.added_tasks,
        }
    }

    /// Validate one call against the known primitive set. Unknown tools and
    /// malformed argument shapes are dropped, not executed.
    fn validate_call(name: &str, args: serde_json::Value) -> Option<ToolCall> {
        let candidate = serde_json::json!({ "tool_name": name, "args": args });
        match serde_json::from_value::<ToolCall>(candidate) {
            Ok(call) => Some(call),
            Err(e) => {
                warn!(tool = %name, error = %e, "Dropping unknown or malformed tool call");
                None
            }
        }
    }

    /// True when some `(tool_name, args)` pair has produced the identical
    /// result at least three times across the loop history.
    fn detect_livelock(state: &AgentState) -> bool {
        let mut seen: HashMap<String, usize> = HashMap::new();
        for record in &state.history {
            for result in &record.tool_results {
                let key = format!(
                    "{}\u{1f}{}\u{1f}{}\u{1f}{}",
                    result.tool_name, result.args_echo, result.output, result.error
                );
                let count = seen.entry(key).or_insert(0);
                *count += 1;
                if *count >= LIVELOCK_REPEATS {
                    return true;
                }
            }
        }
        false
    }

    /// Cheap probe: is this batch byte-for-byte the previous loop's batch?
    /// Used to warn in prompts before the full livelock guard trips.
    pub fn repeats_previous_batch(state: &AgentState, candidate: &[ToolCall]) -> bool {
        let Some(previous) = state
            .history
            .iter()
            .rev()
            .nth(1)
            .and_then(|r| r.planner_output.as_ref())
        else {
            return false;
        };
        !candidate.is_empty() && previous.tool_calls == candidate
    }

    fn build_system_prompt(&self, memory: &MemorySnapshot, state: &AgentState) -> String {
        format!(
            "{PLANNER_INSTRUCTIONS}\n\n\
             Available Tools:\n{}\n\n\
             Long-term Memory (preferences, environment, repeated decisions):\n{}\n\n\
             {}\n\n\
             Current Goal: {}",
            render_catalog(),
            memory.to_context(2000),
            state.to_context(self.max_loops),
            state
                .remaining_tasks
                .first()
                .map(String::as_str)
                .unwrap_or("Complete the request"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsloop_core::{ToolName, ToolResult, STOP_LOOP_DETECTED, STOP_PARSE_FAILED};

    fn outcome_text(text: &str) -> ChatOutcome {
        ChatOutcome {
            content: text.into(),
            tool_calls: vec![],
        }
    }

    #[test]
    fn parses_strict_json_plan() {
        let output = Planner::interpret(&outcome_text(
            r#"{"need_tools": true,
                "tool_calls": [{"tool_name": "read_file", "args": {"path": "hello.txt"}}],
                "reason_brief": "read the file",
                "stop_condition": "file content shown"}"#,
        ));
        assert!(output.need_tools);
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.tool_calls[0].name(), ToolName::ReadFile);
        assert_eq!(output.reason_brief, "read the file");
    }

    #[test]
    fn json_wrapped_in_prose_is_extracted() {
        let output = Planner::interpret(&outcome_text(
            r#"Sure! Here's the plan:
{"need_tools": false, "tool_calls": [], "reason_brief": "answer from memory", "stop_condition": "done"}
Hope that helps."#,
        ));
        assert!(!output.need_tools);
        assert_eq!(output.reason_brief, "answer from memory");
    }

    #[test]
    fn unknown_tools_are_dropped_silently() {
        let output = Planner::interpret(&outcome_text(
            r#"{"need_tools": true, "tool_calls": [
                {"tool_name": "format_disk", "args": {}},
                {"tool_name": "list_dir", "args": {"path": "."}}
            ], "reason_brief": "", "stop_condition": ""}"#,
        ));
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.tool_calls[0].name(), ToolName::ListDir);
    }

    #[test]
    fn need_tools_false_forces_empty_calls() {
        let output = Planner::interpret(&outcome_text(
            r#"{"need_tools": false, "tool_calls": [{"tool_name": "list_dir", "args": {}}],
                "reason_brief": "", "stop_condition": ""}"#,
        ));
        assert!(!output.need_tools);
        assert!(output.tool_calls.is_empty());
    }

    #[test]
    fn tool_call_marker_fallback() {
        let output = Planner::interpret(&outcome_text(
            r#"I need to look at the file.
TOOL_CALL: {"name": "read_file", "args": {"path": "notes.md"}}"#,
        ));
        assert!(output.need_tools);
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.tool_calls[0].name(), ToolName::ReadFile);
        assert!(output.stop_condition.is_empty());
    }

    #[test]
    fn unparseable_response_degrades_gracefully() {
        let output = Planner::interpret(&outcome_text("I cannot express this as JSON, sorry."));
        assert!(!output.need_tools);
        assert!(output.tool_calls.is_empty());
        assert_eq!(output.stop_condition, STOP_PARSE_FAILED);
        assert!(output.reason_brief.contains("cannot express"));
    }

    #[test]
    fn structured_channel_takes_precedence() {
        let outcome = ChatOutcome {
            content: "ignored".into(),
            tool_calls: vec![ChatToolCall {
                id: "call_1".into(),
                name: "grep".into(),
                arguments: r#"{"pattern": "TODO", "path": "src"}"#.into(),
            }],
        };
        let output = Planner::interpret(&outcome);
        assert!(output.need_tools);
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.tool_calls[0].name(), ToolName::Grep);
    }

    #[test]
    fn structured_channel_with_only_unknown_tools_falls_back_to_text() {
        let outcome = ChatOutcome {
            content: r#"{"need_tools": false, "tool_calls": [], "reason_brief": "nothing to do", "stop_condition": "done"}"#.into(),
            tool_calls: vec![ChatToolCall {
                id: "call_1".into(),
                name: "unknown_tool".into(),
                arguments: "{}".into(),
            }],
        };
        let output = Planner::interpret(&outcome);
        assert!(!output.need_tools);
        assert_eq!(output.reason_brief, "nothing to do");
    }

    #[test]
    fn overlong_reason_is_clipped() {
        let long = "x".repeat(500);
        let output = Planner::interpret(&outcome_text(&format!(
            r#"{{"need_tools": false, "tool_calls": [], "reason_brief": "{long}", "stop_condition": ""}}"#
        )));
        assert_eq!(output.reason_brief.chars().count(), 300);
    }

    fn repeated_result_state(repeats: usize) -> AgentState {
        let mut state = AgentState::new("req");
        for i in 0..repeats {
            state.start_loop(i as u32 + 1).unwrap();
            state.record_tool_results(vec![ToolResult {
                tool_name: ToolName::ListDir,
                args_echo: serde_json::json!({"path": "."}),
                success: true,
                output: "a.txt".into(),
                error: String::new(),
                exit_code: Some(0),
                duration_sec: 0.0,
                output_length: 5,
            }]);
        }
        state
    }

    #[test]
    fn livelock_trips_after_three_identical_results() {
        assert!(!Planner::detect_livelock(&repeated_result_state(2)));
        assert!(Planner::detect_livelock(&repeated_result_state(3)));
    }

    #[test]
    fn differing_results_are_not_a_livelock() {
        let mut state = AgentState::new("req");
        for i in 0..4u32 {
            state.start_loop(i + 1).unwrap();
            state.record_tool_results(vec![ToolResult {
                tool_name: ToolName::ListDir,
                args_echo: serde_json::json!({"path": "."}),
                success: true,
                output: format!("file_{i}.txt"),
                error: String::new(),
                exit_code: Some(0),
                duration_sec: 0.0,
                output_length: 10,
            }]);
        }
        assert!(!Planner::detect_livelock(&state));
    }

    #[test]
    fn loop_detected_output_shape() {
        let output = PlannerOutput::loop_detected();
        assert!(!output.need_tools);
        assert_eq!(output.stop_condition, STOP_LOOP_DETECTED);
    }

    #[test]
    fn repeated_batch_probe() {
        use opsloop_core::ToolCall;

        let calls = vec![ToolCall::ListDir { path: ".".into() }];
        let mut state = AgentState::new("req");
        state.start_loop(1).unwrap();
        state.record_planner_output(PlannerOutput {
            need_tools: true,
            tool_calls: calls.clone(),
            ..Default::default()
        });
        state.start_loop(2).unwrap();

        assert!(Planner::repeats_previous_batch(&state, &calls));
        let different = vec![ToolCall::ListDir { path: "src".into() }];
        assert!(!Planner::repeats_previous_batch(&state, &different));
        assert!(!Planner::repeats_previous_batch(&state, &[]));
    }

    #[test]
    fn planner_deltas_come_through() {
        let output = Planner::interpret(&outcome_text(
            r#"{"need_tools": true,
                "tool_calls": [{"tool_name": "list_dir", "args": {}}],
                "reason_brief": "look around",
                "stop_condition": "",
                "new_facts": ["workspace exists"],
                "added_tasks": ["inspect files"]}"#,
        ));
        assert_eq!(output.new_facts, vec!["workspace exists"]);
        assert_eq!(output.added_tasks, vec!["inspect files"]);
    }
}
