//! Per-conversation state — the short-term scratchpad of one `run(request)`.
//!
//! State is reset at the start of every top-level run and never shared across
//! requests. The invariant `loop_count == history.len()` holds at every loop
//! boundary; breaking it is an implementation bug and aborts the run.

use crate::call::ToolName;
use crate::error::Error;
use crate::outcome::{PlannerOutput, ResponderOutput, ToolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Record of one iteration of the Planner → Tool Runner → Responder loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopRecord {
    pub loop_id: u32,
    pub timestamp: DateTime<Utc>,
    pub planner_output: Option<PlannerOutput>,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
    pub responder_output: Option<ResponderOutput>,
}

/// Short-term state for a single request.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub loop_count: u32,
    pub user_request: String,
    pub history: Vec<LoopRecord>,
    /// Short strings summarising what has been discovered. Deduplicated by
    /// exact match, insertion-ordered.
    pub facts: Vec<String>,
    /// Open subgoals, insertion-ordered.
    pub remaining_tasks: Vec<String>,
    /// Most recent result per tool.
    pub last_tool_results: HashMap<ToolName, ToolResult>,
}

impl AgentState {
    pub fn new(user_request: impl Into<String>) -> Self {
        Self {
            user_request: user_request.into(),
            ..Self::default()
        }
    }

    /// Mark the start of loop `loop_id`, opening its record.
    ///
    /// Enforces the boundary invariant: loops are numbered 1..=N and each
    /// opens exactly one record.
    pub fn start_loop(&mut self, loop_id: u32) -> Result<(), Error> {
        if loop_id != self.loop_count + 1 || self.history.len() != self.loop_count as usize {
            return Err(Error::Invariant(format!(
                "loop counter out of sync: starting loop {loop_id} with loop_count {} and {} history records",
                self.loop_count,
                self.history.len()
            )));
        }
        self.loop_count = loop_id;
        self.history.push(LoopRecord {
            loop_id,
            timestamp: Utc::now(),
            planner_output: None,
            tool_results: Vec::new(),
            responder_output: None,
        });
        Ok(())
    }

    /// Record the Planner's decision for the current loop and apply its
    /// state deltas (`new_facts`, `resolved_tasks`, `added_tasks`).
    pub fn record_planner_output(&mut self, output: PlannerOutput) {
        for fact in &output.new_facts {
            self.add_fact(fact);
        }
        for task in &output.resolved_tasks {
            self.resolve_task(task);
        }
        for task in &output.added_tasks {
            self.add_task(task);
        }
        if let Some(record) = self.history.last_mut() {
            record.planner_output = Some(output);
        }
    }

    /// Record the tool results of the current loop.
    pub fn record_tool_results(&mut self, results: Vec<ToolResult>) {
        for result in &results {
            self.last_tool_results
                .insert(result.tool_name, result.clone());
        }
        if let Some(record) = self.history.last_mut() {
            record.tool_results = results;
        }
    }

    /// Record the Responder's reply for the current loop.
    pub fn record_responder_output(&mut self, output: ResponderOutput) {
        if let Some(record) = self.history.last_mut() {
            record.responder_output = Some(output);
        }
    }

    pub fn add_fact(&mut self, fact: &str) {
        if !fact.is_empty() && !self.facts.iter().any(|f| f == fact) {
            self.facts.push(fact.to_string());
        }
    }

    pub fn add_task(&mut self, task: &str) {
        if !task.is_empty() && !self.remaining_tasks.iter().any(|t| t == task) {
            self.remaining_tasks.push(task.to_string());
        }
    }

    pub fn resolve_task(&mut self, task: &str) {
        self.remaining_tasks.retain(|t| t != task);
    }

    /// Render the state for LLM prompts: loop progress, recent facts,
    /// remaining tasks, and the latest tool results.
    pub fn to_context(&self, max_loops: u32) -> String {
        let mut parts = vec![
            "## Current State".to_string(),
            format!("Loop: {}/{}", self.loop_count, max_loops),
            format!("Facts gathered: {}", self.facts.len()),
            format!("Tasks remaining: {}", self.remaining_tasks.len()),
        ];

        if !self.facts.is_empty() {
            parts.push("\n## Facts Gathered".into());
            let start = self.facts.len().saturating_sub(5);
            for fact in &self.facts[start..] {
                parts.push(format!("- {fact}"));
            }
        }

        if !self.remaining_tasks.is_empty() {
            parts.push("\n## Remaining Tasks".into());
            for task in &self.remaining_tasks {
                parts.push(format!("- {task}"));
            }
        }

        if let Some(record) = self.history.last() {
            if !record.tool_results.is_empty() {
                parts.push("\n## Last Tool Results".into());
                for result in record.tool_results.iter().rev().take(3).rev() {
                    parts.push(format!("- {}", result.summary_line(80)));
                }
            }
        }

        parts.join("\n")
    }

    /// Summarise recent loop records for the Planner prompt. Output previews
    /// are bounded so the prompt does not grow with tool output size.
    pub fn history_summary(&self, max_loops: usize) -> String {
        let start = self.history.len().saturating_sub(max_loops);
        let recent = &self.history[start..];

        if recent.is_empty() {
            return "## Loop History (none yet)".into();
        }

        let mut lines = vec![format!("## Loop History (recent {} loops)", recent.len())];
        for record in recent {
            lines.push(format!("\nLoop {}:", record.loop_id));
            if let Some(plan) = &record.planner_output {
                lines.push(format!(
                    "  Planner: {} (tools: {})",
                    plan.reason_brief,
                    plan.tool_calls.len()
                ));
            }
            for result in &record.tool_results {
                lines.push(format!("  {}", result.summary_line(500)));
            }
            if let Some(reply) = &record.responder_output {
                let preview: String = reply.response.chars().take(100).collect();
                lines.push(format!("  Response: {}", preview.replace('\n', " ")));
                if !reply.next_action.is_empty() {
                    lines.push(format!("  Next: {}", reply.next_action.replace('\n', " ")));
                }
            }
        }
        lines.join("\n")
    }
}
