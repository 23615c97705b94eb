//! The Responder — second LLM call of each loop.
//!
//! Given the tool results, produces the natural-language reply. Never
//! invents facts beyond the tool outputs; states the next action when the
//! goal is unmet; flags the final answer when it is. Also produces the
//! limit-reached synthesis when the loop budget runs out.

use crate::extract::extract_object_with_key;
use opsloop_core::{
    AgentState, ChatMessage, ChatProvider, ChatRequest, Error, ResponderOutput, ToolResult,
};
use opsloop_memory::MemorySnapshot;
use opsloop_security::AuditLog;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const RESPONDER_INSTRUCTIONS: &str = r#"You are the response stage of an OS automation agent.

Explain the results of the executed tools to the user in clear, natural language.
Keep responses SHORT and EASY TO READ.

RULES:
1. Only state facts from the tool results below
2. If a tool failed, explain why briefly and suggest one or two fixes
3. Be concise; use bullet points for listings
4. Do NOT make assumptions beyond what the tools returned
5. If the user's goal remains unmet, state the next action
6. If the goal is met, include the JSON block {"is_final_answer": true} and give the final answer"#;

/// Phrasings that signal the Responder still plans further work. Used only
/// as an early-exit heuristic when no explicit final flag is present.
const IMPERATIVE_HINTS: &[&str] = &[
    "next step",
    "next, ",
    "i will",
    "i'll",
    "need to",
    "still need",
    "remaining",
    "then i",
    "let me",
];

pub struct Responder {
    provider: Arc<dyn ChatProvider>,
    max_loops: u32,
}

impl Responder {
    pub fn new(provider: Arc<dyn ChatProvider>, max_loops: u32) -> Self {
        Self {
            provider,
            max_loops,
        }
    }

    /// Generate the reply for one loop.
    pub async fn respond(
        &self,
        request: &str,
        results: &[ToolResult],
        memory: &MemorySnapshot,
        state: &AgentState,
        audit: &AuditLog,
    ) -> Result<ResponderOutput, Error> {
        let loop_id = state.loop_count;
        let system = self.build_system_prompt(request, memory, state);
        let user = format!(
            "{}\n\nGenerate a natural language response based on the tool results above.",
            Self::render_results(results)
        );

        let outcome = self
            .provider
            .complete(ChatRequest::text_only(vec![
                ChatMessage::system(system),
                ChatMessage::user(user),
            ]))
            .await
            .map_err(|e| {
                audit.record_error(loop_id, "ResponderLLMError", &e.to_string());
                Error::Provider(e)
            })?;

        let output = Self::parse_output(&outcome.content, results, state);
        debug!(
            loop_id,
            is_final = output.is_final_answer,
            chars = output.response.len(),
            "Responder reply"
        );
        audit.record_responder_response(loop_id, &output.response, results.len());
        Ok(output)
    }

    /// The one extra Responder call made when `max_loops` is exhausted:
    /// summarise what was achieved, list unresolved tasks, reference the
    /// audit log.
    pub async fn synthesise_limit_reached(
        &self,
        request: &str,
        memory: &MemorySnapshot,
        state: &AgentState,
        audit: &AuditLog,
        audit_path: &Path,
    ) -> Result<ResponderOutput, Error> {
        let max_loops = self.max_loops;
        let instruction = format!(
            "The loop limit ({max_loops} iterations) was reached before the request completed.\n\
             Summarise what was achieved, list the unresolved tasks, and mention that the full \
             execution record is in the audit log at {}.",
            audit_path.display()
        );
        let system = format!(
            "{RESPONDER_INSTRUCTIONS}\n\n{instruction}\n\n{}\n\n{}\n\nOriginal User Request:\n{request}",
            memory.to_context(2000),
            state.to_context(max_loops),
        );

        let outcome = self
            .provider
            .complete(ChatRequest::text_only(vec![
                ChatMessage::system(system),
                ChatMessage::user("Generate the closing summary."),
            ]))
            .await
            .map_err(|e| {
                audit.record_error(state.loop_count, "ResponderLLMError", &e.to_string());
                Error::Provider(e)
            })?;

        let response = if outcome.content.trim().is_empty() {
            Self::limit_reached_fallback(state, audit_path, max_loops)
        } else {
            outcome.content
        };

        let output = ResponderOutput {
            summary: format!("loop limit of {max_loops} reached"),
            next_action: String::new(),
            is_final_answer: true,
            response,
        };
        audit.record_responder_response(state.loop_count, &output.response, 0);
        Ok(output)
    }

    /// Deterministic closing text when the endpoint returns nothing usable.
    fn limit_reached_fallback(state: &AgentState, audit_path: &Path, max_loops: u32) -> String {
        let mut parts = vec![
            format!("Reached the maximum loop limit ({max_loops} iterations)."),
            String::new(),
            "Summary of findings:".into(),
        ];
        if state.facts.is_empty() {
            parts.push("  (no facts discovered)".into());
        } else {
            for fact in &state.facts {
                parts.push(format!("  - {fact}"));
            }
        }
        if !state.remaining_tasks.is_empty() {
            parts.push(String::new());
            parts.push("Remaining tasks:".into());
            for task in &state.remaining_tasks {
                parts.push(format!("  - {task}"));
            }
        }
        parts.push(String::new());
        parts.push(format!(
            "The full execution record is in the audit log at {}.",
            audit_path.display()
        ));
        parts.join("\n")
    }

    fn build_system_prompt(
        &self,
        request: &str,
        memory: &MemorySnapshot,
        state: &AgentState,
    ) -> String {
        format!(
            "{RESPONDER_INSTRUCTIONS}\n\n\
             User's Memory (preferences, environment, history):\n{}\n\n\
             {}\n\n\
             Original User Request:\n{request}\n\n\
             User's Goal: {}",
            memory.to_context(2000),
            state.to_context(self.max_loops),
            state
                .remaining_tasks
                .first()
                .map(String::as_str)
                .unwrap_or("Complete the request"),
        )
    }

    /// Render each tool result as a numbered block with a bounded preview.
    fn render_results(results: &[ToolResult]) -> String {
        if results.is_empty() {
            return "No tools were executed in this loop.".into();
        }

        let mut lines = vec!["Tool Execution Results:".to_string()];
        for (i, result) in results.iter().enumerate() {
            lines.push(format!("\n{}. {} (args: {})", i + 1, result.tool_name, result.args_echo));
            if result.success {
                lines.push("   Status: success".into());
                let preview: String = result.output.chars().take(200).collect();
                let hidden = result.output.chars().count().saturating_sub(200);
                if hidden > 0 {
                    lines.push(format!("   Output: {preview}... ({hidden} more chars)"));
                } else {
                    lines.push(format!("   Output: {preview}"));
                }
            } else {
                lines.push("   Status: failed".into());
                lines.push(format!("   Error: {}", result.error));
                if let Some(code) = result.exit_code {
                    lines.push(format!("   Exit code: {code}"));
                }
            }
            if result.duration_sec > 0.0 {
                lines.push(format!("   Duration: {:.2}s", result.duration_sec));
            }
        }
        lines.join("\n")
    }

    /// Structure the free-text reply: finality, summary, next action.
    fn parse_output(text: &str, results: &[ToolResult], state: &AgentState) -> ResponderOutput {
        let response = if text.trim().is_empty() {
            // The response must never be empty once the Responder ran
            Self::render_results(results)
        } else {
            text.to_string()
        };

        let is_final = match extract_object_with_key(text, "is_final_answer")
            .and_then(|v| v["is_final_answer"].as_bool())
        {
            Some(flag) => flag,
            None => Self::final_answer_heuristic(text, results, state),
        };

        let summary = Self::extract_summary(&response, results);
        let next_action = if is_final {
            String::new()
        } else {
            Self::extract_next_action(&response)
        };

        ResponderOutput {
            response,
            summary,
            next_action,
            is_final_answer: is_final,
        }
    }

    /// Early-exit heuristic used when no explicit flag is present: the goal
    /// looks met when no tasks remain, not everything failed, and the text
    /// does not promise further work.
    fn final_answer_heuristic(text: &str, results: &[ToolResult], state: &AgentState) -> bool {
        if !state.remaining_tasks.is_empty() {
            return false;
        }
        if !results.is_empty() && results.iter().all(|r| !r.success) {
            return false;
        }
        let lower = text.to_lowercase();
        !IMPERATIVE_HINTS.iter().any(|hint| lower.contains(hint))
    }

    fn extract_summary(response: &str, results: &[ToolResult]) -> String {
        let mut parts = Vec::new();
        for result in results {
            if result.success {
                parts.push(format!("{} succeeded", result.tool_name));
            } else {
                let error: String = result.error.chars().take(50).collect();
                parts.push(format!("{} failed: {error}", result.tool_name));
            }
        }
        if parts.is_empty() {
            response.chars().take(100).collect()
        } else {
            parts.join("; ")
        }
    }

    fn extract_next_action(response: &str) -> String {
        let lines: Vec<&str> = response.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            let lower = line.to_lowercase();
            if lower.contains("next") || lower.contains("should") || lower.contains("then") {
                let mut picked = vec![*line];
                if let Some(following) = lines.get(i + 1) {
                    picked.push(*following);
                }
                return picked.join("\n").trim().to_string();
            }
        }
        String::new()
    }
}
