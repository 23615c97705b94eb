//! Audit log — append-only JSONL record of every tool invocation.
//!
//! One entry per line. Entries are written immediately after each tool call
//! and never mutated; the log is the authoritative execution history. A
//! single writer lock guarantees each line lands whole even with multiple
//! agents sharing one file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// The record of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub loop_id: u32,
    pub tool_name: String,
    pub args: serde_json::Value,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration_sec: f64,
    pub output_length: usize,
}

/// Aggregate statistics over the recorded tool calls.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCallSummary {
    pub total_calls: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_duration_sec: f64,
    pub by_tool: BTreeMap<String, PerToolStats>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PerToolStats {
    pub calls: usize,
    pub successful: usize,
    pub failed: usize,
    pub total_duration_sec: f64,
}

struct AuditInner {
    entries: Vec<AuditEntry>,
    file: std::fs::File,
}

/// Append-only audit logger backed by a JSONL file.
pub struct AuditLog {
    path: PathBuf,
    inner: Mutex<AuditInner>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.inner.lock().unwrap().entries.len();
        f.debug_struct("AuditLog")
            .field("path", &self.path)
            .field("entry_count", &count)
            .finish()
    }
}

impl AuditLog {
    /// Open (or create) the log file in append mode.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            inner: Mutex::new(AuditInner {
                entries: Vec::new(),
                file,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a tool invocation. Written to disk immediately.
    pub fn record_tool_call(&self, entry: AuditEntry) {
        let mut inner = self.inner.lock().unwrap();
        match serde_json::to_string(&entry) {
            Ok(line) => Self::write_line(&mut inner.file, &line),
            Err(e) => warn!(error = %e, "Failed to serialize audit entry"),
        }
        inner.entries.push(entry);
    }

    /// Record the Planner's decision for a loop.
    pub fn record_planner_decision(
        &self,
        loop_id: u32,
        need_tools: bool,
        tool_count: usize,
        reasoning: &str,
    ) {
        self.record_side_event(serde_json::json!({
            "timestamp": Utc::now(),
            "loop_id": loop_id,
            "event": "planner_decision",
            "need_tools": need_tools,
            "tool_count": tool_count,
            "reasoning": clip(reasoning, 500),
        }));
    }

    /// Record the Responder's reply for a loop.
    pub fn record_responder_response(&self, loop_id: u32, response: &str, tool_count: usize) {
        self.record_side_event(serde_json::json!({
            "timestamp": Utc::now(),
            "loop_id": loop_id,
            "event": "responder_response",
            "response_preview": clip(response, 300),
            "tool_count_processed": tool_count,
        }));
    }

    /// Record an error event.
    pub fn record_error(&self, loop_id: u32, error_type: &str, message: &str) {
        self.record_side_event(serde_json::json!({
            "timestamp": Utc::now(),
            "loop_id": loop_id,
            "event": "error",
            "error_type": error_type,
            "error_message": clip(message, 500),
        }));
    }

    fn record_side_event(&self, value: serde_json::Value) {
        let mut inner = self.inner.lock().unwrap();
        match serde_json::to_string(&value) {
            Ok(line) => Self::write_line(&mut inner.file, &line),
            Err(e) => warn!(error = %e, "Failed to serialize audit event"),
        }
    }

    fn write_line(file: &mut std::fs::File, line: &str) {
        if let Err(e) = writeln!(file, "{line}") {
            warn!(error = %e, "Failed to append to audit log");
        }
    }

    /// All tool-call entries recorded by this process, in execution order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.inner.lock().unwrap().entries.clone()
    }

    /// Count of tool-call entries recorded by this process.
    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Aggregate per-tool statistics over the recorded calls.
    pub fn tool_summary(&self) -> ToolCallSummary {
        let inner = self.inner.lock().unwrap();
        let mut summary = ToolCallSummary::default();
        for entry in &inner.entries {
            summary.total_calls += 1;
            summary.total_duration_sec += entry.duration_sec;
            if entry.success {
                summary.successful += 1;
            } else {
                summary.failed += 1;
            }
            let per_tool = summary.by_tool.entry(entry.tool_name.clone()).or_default();
            per_tool.calls += 1;
            per_tool.total_duration_sec += entry.duration_sec;
            if entry.success {
                per_tool.successful += 1;
            } else {
                per_tool.failed += 1;
            }
        }
        summary
    }
}

fn clip(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(loop_id: u32, tool: &str, success: bool) -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            loop_id,
            tool_name: tool.into(),
            args: serde_json::json!({"path": "hello.txt"}),
            success,
            exit_code: if success { Some(0) } else { None },
            duration_sec: 0.25,
            output_length: 42,
        }
    }

    #[test]
    fn lines_parse_back_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlog.jsonl");
        let log = AuditLog::open(&path).unwrap();

        log.record_tool_call(entry(1, "read_file", true));
        log.record_tool_call(entry(1, "exec_cmd", false));
        log.record_tool_call(entry(2, "grep", true));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);

        let appended = log.entries();
        for (line, original) in lines.iter().zip(&appended) {
            let parsed: AuditEntry = serde_json::from_str(line).unwrap();
            assert_eq!(parsed.tool_name, original.tool_name);
            assert_eq!(parsed.loop_id, original.loop_id);
            assert_eq!(parsed.success, original.success);
            assert_eq!(parsed.args, original.args);
            assert_eq!(parsed.output_length, original.output_length);
        }
    }

    #[test]
    fn args_survive_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlog.jsonl");
        let log = AuditLog::open(&path).unwrap();

        let args = serde_json::json!({"command": "echo \"quoted\" && done", "timeout": 5});
        let mut e = entry(1, "exec_cmd", true);
        e.args = args.clone();
        log.record_tool_call(e);

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: AuditEntry = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(parsed.args, args);
    }

    #[test]
    fn side_events_share_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlog.jsonl");
        let log = AuditLog::open(&path).unwrap();

        log.record_planner_decision(1, true, 2, "list then read");
        log.record_tool_call(entry(1, "list_dir", true));
        log.record_responder_response(1, "Found two files.", 1);
        log.record_error(2, "PlannerLLMError", "connection refused");

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);
        assert!(content.contains("planner_decision"));
        assert!(content.contains("responder_response"));
        assert!(content.contains("PlannerLLMError"));
        // Tool-call entries are tracked separately from side events
        assert_eq!(log.count(), 1);
    }

    #[test]
    fn summary_aggregates_per_tool() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().join("runlog.jsonl")).unwrap();

        log.record_tool_call(entry(1, "read_file", true));
        log.record_tool_call(entry(1, "read_file", false));
        log.record_tool_call(entry(2, "exec_cmd", true));

        let summary = log.tool_summary();
        assert_eq!(summary.total_calls, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.by_tool["read_file"].calls, 2);
        assert_eq!(summary.by_tool["read_file"].failed, 1);
        assert_eq!(summary.by_tool["exec_cmd"].successful, 1);
    }

    #[test]
    fn append_mode_preserves_prior_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("runlog.jsonl");

        {
            let log = AuditLog::open(&path).unwrap();
            log.record_tool_call(entry(1, "list_dir", true));
        }
        {
            let log = AuditLog::open(&path).unwrap();
            log.record_tool_call(entry(1, "grep", true));
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
