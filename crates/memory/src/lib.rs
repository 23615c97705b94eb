//! Long-term memory — a persistent mapping of categorised facts.
//!
//! The store is a single JSON document: an object keyed by category, each
//! category an object keyed by fact key. Four categories are in regular use
//! (`user_preferences`, `environment`, `repeated_decisions`, `facts`), but
//! the shape is open.
//!
//! Writes go through `append_fact`: read-modify-write under a writer lock,
//! committed by writing a temp file and renaming it over the original.
//! Readers take immutable snapshots. An absent file is an empty memory.

use opsloop_core::MemoryError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const CATEGORY_PREFERENCES: &str = "user_preferences";
pub const CATEGORY_ENVIRONMENT: &str = "environment";
pub const CATEGORY_DECISIONS: &str = "repeated_decisions";
pub const CATEGORY_FACTS: &str = "facts";

type MemoryData = BTreeMap<String, BTreeMap<String, Value>>;

/// An immutable copy of the memory contents, used for prompt building.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySnapshot {
    data: MemoryData,
}

impl MemorySnapshot {
    pub fn get(&self, category: &str, key: &str) -> Option<&Value> {
        self.data.get(category).and_then(|m| m.get(key))
    }

    pub fn category(&self, category: &str) -> Option<&BTreeMap<String, Value>> {
        self.data.get(category)
    }

    pub fn is_empty(&self) -> bool {
        self.data.values().all(|m| m.is_empty())
    }

    /// Render memory as categorised key/value lines for LLM prompts,
    /// truncated to `max_chars`.
    pub fn to_context(&self, max_chars: usize) -> String {
        if self.is_empty() {
            return "(No memory yet)".into();
        }

        let mut parts: Vec<String> = Vec::new();
        let known = [
            (CATEGORY_PREFERENCES, "## User Preferences"),
            (CATEGORY_ENVIRONMENT, "## Environment"),
            (CATEGORY_DECISIONS, "## Repeated Decisions"),
            (CATEGORY_FACTS, "## Known Facts"),
        ];

        for (category, heading) in known {
            if let Some(entries) = self.data.get(category) {
                if entries.is_empty() {
                    continue;
                }
                if !parts.is_empty() {
                    parts.push(String::new());
                }
                parts.push(heading.into());
                for (key, value) in entries {
                    parts.push(format!("- {key}: {}", render_value(value)));
                }
            }
        }

        // Any categories beyond the known four
        for (category, entries) in &self.data {
            if known.iter().any(|(k, _)| k == category) || entries.is_empty() {
                continue;
            }
            if !parts.is_empty() {
                parts.push(String::new());
            }
            parts.push(format!("## {category}"));
            for (key, value) in entries {
                parts.push(format!("- {key}: {}", render_value(value)));
            }
        }

        let context = parts.join("\n");
        if context.chars().count() > max_chars {
            let cut: String = context.chars().take(max_chars).collect();
            format!("{cut}\n... (truncated)")
        } else {
            context
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The persistent memory store. Process-wide singleton owned by the agent.
pub struct MemoryStore {
    path: PathBuf,
    data: RwLock<MemoryData>,
}

impl MemoryStore {
    /// Load memory from `path`. An absent file yields an empty store; an
    /// unreadable one is reported and treated as empty.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = Self::read_file(&path);
        debug!(path = %path.display(), categories = data.len(), "Memory loaded");
        Self {
            path,
            data: RwLock::new(data),
        }
    }

    fn read_file(path: &Path) -> MemoryData {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return MemoryData::default(),
        };
        match serde_json::from_str(&content) {
            Ok(data) => data,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Memory file unreadable, starting empty");
                MemoryData::default()
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store one fact. Read-modify-write under the writer lock, committed
    /// atomically via temp file + rename.
    pub async fn append_fact(
        &self,
        category: &str,
        key: &str,
        value: Value,
    ) -> Result<(), MemoryError> {
        let mut data = self.data.write().await;

        // Re-read under the lock so concurrent agents sharing the file
        // do not clobber each other's appends.
        if self.path.exists() {
            let on_disk = Self::read_file(&self.path);
            for (cat, entries) in on_disk {
                let merged = data.entry(cat).or_default();
                for (k, v) in entries {
                    merged.entry(k).or_insert(v);
                }
            }
        }

        data.entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value);

        self.commit(&data)
    }

    fn commit(&self, data: &MemoryData) -> Result<(), MemoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Storage(format!("create memory dir: {e}")))?;
        }

        let json = serde_json::to_string_pretty(data)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| MemoryError::Storage(format!("write memory temp file: {e}")))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| MemoryError::Storage(format!("commit memory file: {e}")))?;
        Ok(())
    }

    /// Persist the current contents (used at end of turn even when nothing
    /// changed, so crash recovery always has the latest document).
    pub async fn persist(&self) -> Result<(), MemoryError> {
        let data = self.data.read().await;
        self.commit(&data)
    }

    /// Immutable copy of the current contents.
    pub async fn snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            data: self.data.read().await.clone(),
        }
    }

    // --- Typed helpers over the four known categories ---

    pub async fn set_preference(&self, key: &str, value: Value) -> Result<(), MemoryError> {
        self.append_fact(CATEGORY_PREFERENCES, key, value).await
    }

    pub async fn set_environment(&self, key: &str, value: Value) -> Result<(), MemoryError> {
        self.append_fact(CATEGORY_ENVIRONMENT, key, value).await
    }

    pub async fn record_decision(&self, key: &str, value: Value) -> Result<(), MemoryError> {
        self.append_fact(CATEGORY_DECISIONS, key, value).await
    }

    pub async fn record_fact(&self, key: &str, value: Value) -> Result<(), MemoryError> {
        self.append_fact(CATEGORY_FACTS, key, value).await
    }
}
