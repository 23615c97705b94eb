//! The loop controller — orchestrates Planner → Tool Runner → Responder.
//!
//! State machine per `run(request)`:
//!
//! ```text
//! INIT → PLAN → [need_tools?] → EXEC → RESPOND → [stop?] → DONE
//!                     |no                            |no
//!                     └────────→ RESPOND ────────────┘
//! ```
//!
//! `max_loops` is a hard upper bound. When it is exhausted, the Responder is
//! called one final time to synthesise a closing summary that lists the
//! unresolved tasks and references the audit log.

use crate::planner::Planner;
use crate::responder::Responder;
use opsloop_core::{AgentState, ChatProvider, Error, STOP_LOOP_DETECTED};
use opsloop_memory::MemoryStore;
use opsloop_security::AuditLog;
use opsloop_tools::ToolRunner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What one `run(request)` produced, with post-run statistics.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub response: String,
    pub loops_used: u32,
    pub facts: Vec<String>,
    pub remaining_tasks: Vec<String>,
    pub tool_calls_total: usize,
    pub tool_success_rate: f64,
}

pub struct AgentLoop {
    planner: Planner,
    responder: Responder,
    runner: ToolRunner,
    memory: Arc<MemoryStore>,
    audit: Arc<AuditLog>,
    max_loops: u32,
    loop_wait: Duration,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        runner: ToolRunner,
        memory: Arc<MemoryStore>,
        audit: Arc<AuditLog>,
        enable_function_calling: bool,
        max_loops: u32,
        loop_wait_sec: f64,
    ) -> Self {
        Self {
            planner: Planner::new(Arc::clone(&provider), enable_function_calling, max_loops),
            responder: Responder::new(provider, max_loops),
            runner,
            memory,
            audit,
            max_loops,
            loop_wait: Duration::from_secs_f64(loop_wait_sec.max(0.0)),
        }
    }

    /// Execute the full loop for one request. State is fresh per call and
    /// discarded when this returns; memory is persisted at the end of the
    /// turn.
    pub async fn run(&self, request: &str) -> Result<RunReport, Error> {
        let mut state = AgentState::new(request);
        info!(request_chars = request.len(), max_loops = self.max_loops, "Starting run");

        let mut final_response: Option<String> = None;

        for loop_id in 1..=self.max_loops {
            state.start_loop(loop_id)?;
            debug!(loop_id, "Loop iteration");

            let memory_snapshot = self.memory.snapshot().await;

            // PLAN
            let plan = self
                .planner
                .plan(request, &memory_snapshot, &state, &self.audit)
                .await?;
            let need_tools = plan.need_tools;
            let stop_condition = plan.stop_condition.clone();
            state.record_planner_output(plan.clone());

            // EXEC: sequential, in the order the Planner emitted
            let results = if need_tools && !plan.tool_calls.is_empty() {
                self.runner.execute_batch(&plan.tool_calls, loop_id).await
            } else {
                Vec::new()
            };
            state.record_tool_results(results.clone());

            // RESPOND
            let reply = self
                .responder
                .respond(request, &results, &memory_snapshot, &state, &self.audit)
                .await?;
            state.record_responder_output(reply.clone());

            // Termination checks, in order
            if reply.is_final_answer {
                final_response = Some(reply.response);
                break;
            }
            if !need_tools
                && stop_condition != STOP_LOOP_DETECTED
                && !reply.response.trim().is_empty()
            {
                // Nothing was executed, so the Responder answered directly
                final_response = Some(reply.response);
                break;
            }
            if stop_condition == STOP_LOOP_DETECTED {
                warn!(loop_id, "Terminating: repeated identical tool calls");
                final_response = Some(format!(
                    "Stopped early: the same tool calls kept returning identical results.\n\n{}",
                    reply.response
                ));
                break;
            }

            if loop_id < self.max_loops {
                tokio::time::sleep(self.loop_wait).await;
            }
        }

        let response = match final_response {
            Some(response) => response,
            None => {
                // One extra Responder call produces the closing synthesis
                info!(max_loops = self.max_loops, "Loop limit reached");
                self.responder
                    .synthesise_limit_reached(
                        request,
                        &self.memory.snapshot().await,
                        &state,
                        &self.audit,
                        self.audit.path(),
                    )
                    .await?
                    .response
            }
        };

        if let Err(e) = self.memory.persist().await {
            warn!(error = %e, "Failed to persist memory at end of turn");
        }

        Ok(Self::report(response, &state))
    }

    fn report(response: String, state: &AgentState) -> RunReport {
        let all_results: Vec<_> = state
            .history
            .iter()
            .flat_map(|r| r.tool_results.iter())
            .collect();
        let successful = all_results.iter().filter(|r| r.success).count();
        let tool_success_rate = if all_results.is_empty() {
            0.0
        } else {
            successful as f64 / all_results.len() as f64
        };

        RunReport {
            response,
            loops_used: state.loop_count,
            facts: state.facts.clone(),
            remaining_tasks: state.remaining_tasks.clone(),
            tool_calls_total: all_results.len(),
            tool_success_rate,
        }
    }
}

impl RunReport {
    /// Human-readable execution summary for the terminal front-end.
    pub fn render_summary(&self, max_loops: u32) -> String {
        let mut lines = vec![
            format!("Loops executed: {}/{max_loops}", self.loops_used),
            format!("Facts discovered: {}", self.facts.len()),
            format!("Remaining tasks: {}", self.remaining_tasks.len()),
            format!("Tool calls: {}", self.tool_calls_total),
        ];
        if self.tool_calls_total > 0 {
            lines.push(format!(
                "Tool success rate: {:.1}%",
                self.tool_success_rate * 100.0
            ));
        }
        lines.join("\n")
    }
}
