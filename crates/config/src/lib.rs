//! Configuration loading, validation, and management for opsloop.
//!
//! The configuration is a single JSON document with sections for the LLM
//! endpoint, the workspace, the security envelope, memory, the audit log,
//! the agent loop, and debugging. A missing file yields the defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// LLM endpoint settings
    #[serde(default)]
    pub vllm: VllmConfig,

    /// Workspace settings
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    /// Security envelope
    #[serde(default)]
    pub security: SecurityConfig,

    /// Long-term memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Audit log settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Agent loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Debug settings
    #[serde(default)]
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VllmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Bearer token; local vLLM deployments usually accept anything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Whether to pass the tool catalogue through the structured-tool
    /// channel. When off, tool calls arrive via the text protocol only.
    #[serde(default = "default_true")]
    pub enable_function_calling: bool,
}

fn default_base_url() -> String {
    "http://localhost:8000/v1".into()
}
fn default_model() -> String {
    "Qwen/Qwen2.5-7B-Instruct".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_true() -> bool {
    true
}

impl Default for VllmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            enable_function_calling: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Every tool-visible path must resolve under this directory.
    #[serde(default = "default_workspace_dir")]
    pub dir: PathBuf,
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("./workspace")
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            dir: default_workspace_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Commands `exec_cmd` may run. Empty list = no restriction.
    ///
    /// The allowlist only inspects the first token of a command; `exec_cmd`
    /// runs through a shell, so operators should keep this to a read-only
    /// subset.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Hard cap on tool execution time, seconds.
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,

    /// Hard cap on tool output, characters. Longer outputs are centre-cut.
    #[serde(default = "default_max_output_size")]
    pub max_output_size: usize,

    /// Master switch for `exec_cmd`.
    #[serde(default = "default_true")]
    pub exec_enabled: bool,
}

fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "grep", "find", "wc", "echo", "head", "tail"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_timeout_sec() -> u64 {
    30
}
fn default_max_output_size() -> usize {
    200_000
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            timeout_sec: default_timeout_sec(),
            max_output_size: default_max_output_size(),
            exec_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_path")]
    pub path: PathBuf,
}

fn default_memory_path() -> PathBuf {
    PathBuf::from("./data/memory.json")
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            path: default_memory_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_path")]
    pub log_path: PathBuf,
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("./data/runlog.jsonl")
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: default_audit_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard upper bound on loop iterations per request.
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,

    /// Wait between loops, seconds. A rate-limit safety margin for the
    /// endpoint.
    #[serde(default = "default_loop_wait_sec")]
    pub loop_wait_sec: f64,
}

fn default_max_loops() -> u32 {
    5
}
fn default_loop_wait_sec() -> f64 {
    0.5
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            loop_wait_sec: default_loop_wait_sec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enabled: bool,

    /// "basic" or "verbose".
    #[serde(default = "default_debug_level")]
    pub level: String,

    /// Per-component toggles, e.g. `{"planner": true}`.
    #[serde(default)]
    pub components: BTreeMap<String, bool>,
}

fn default_debug_level() -> String {
    "basic".into()
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            level: default_debug_level(),
            components: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.vllm.temperature) {
            return Err(ConfigError::ValidationError(
                "vllm.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.agent.max_loops == 0 {
            return Err(ConfigError::ValidationError(
                "agent.max_loops must be at least 1".into(),
            ));
        }
        if self.security.timeout_sec == 0 {
            return Err(ConfigError::ValidationError(
                "security.timeout_sec must be positive".into(),
            ));
        }
        if self.security.max_output_size == 0 {
            return Err(ConfigError::ValidationError(
                "security.max_output_size must be positive".into(),
            ));
        }
        if self.agent.loop_wait_sec < 0.0 {
            return Err(ConfigError::ValidationError(
                "agent.loop_wait_sec must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Generate the default config document (for `opsloop init`).
    pub fn default_json() -> String {
        serde_json::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agent.max_loops, 5);
        assert!((config.agent.loop_wait_sec - 0.5).abs() < f64::EPSILON);
        assert!(config.security.allowed_commands.contains(&"ls".into()));
        assert!(config.vllm.enable_function_calling);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.vllm.base_url, config.vllm.base_url);
        assert_eq!(parsed.security.max_output_size, config.security.max_output_size);
        assert_eq!(parsed.memory.path, config.memory.path);
    }

    #[test]
    fn partial_document_fills_defaults() {
        let json = r#"{"vllm": {"model": "my-model"}, "agent": {"max_loops": 3}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.vllm.model, "my-model");
        assert_eq!(config.vllm.base_url, "http://localhost:8000/v1");
        assert_eq!(config.agent.max_loops, 3);
        assert!((config.agent.loop_wait_sec - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/opsloop.json"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().agent.max_loops, 5);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.vllm.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_loops_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_loops = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_from_file_round_trip() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        write!(tmp, "{}", AppConfig::default_json()).unwrap();
        let config = AppConfig::load_from(tmp.path()).unwrap();
        assert_eq!(config.security.timeout_sec, 30);
    }

    #[test]
    fn default_json_contains_all_sections() {
        let json = AppConfig::default_json();
        for section in ["vllm", "workspace", "security", "memory", "audit", "agent", "debug"] {
            assert!(json.contains(&format!("\"{section}\"")), "missing {section}");
        }
    }
}
