//! Tool call types — the tagged sum type over the six tool primitives.
//!
//! The Planner emits calls as loose JSON (`{"tool_name": ..., "args": {...}}`);
//! deserializing into `ToolCall` gives each tool its statically-typed argument
//! shape. Unknown argument keys are ignored by serde; unknown tool names fail
//! deserialization and are dropped by the Planner.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The name of one of the six tool primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ListDir,
    ReadFile,
    WriteFile,
    EditFile,
    ExecCmd,
    Grep,
}

impl ToolName {
    /// All six primitives, in catalogue order.
    pub const ALL: [ToolName; 6] = [
        ToolName::ListDir,
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::EditFile,
        ToolName::ExecCmd,
        ToolName::Grep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ListDir => "list_dir",
            ToolName::ReadFile => "read_file",
            ToolName::WriteFile => "write_file",
            ToolName::EditFile => "edit_file",
            ToolName::ExecCmd => "exec_cmd",
            ToolName::Grep => "grep",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

/// A single tool invocation with its statically-typed arguments.
///
/// Serialized form matches the Planner wire protocol:
/// `{"tool_name": "read_file", "args": {"path": "notes.txt"}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool_name", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    ListDir {
        #[serde(default = "default_path")]
        path: String,
    },
    ReadFile {
        path: String,
        /// 0-based line index to start reading from.
        #[serde(default)]
        offset: usize,
        /// Maximum number of lines to read.
        #[serde(default)]
        limit: Option<usize>,
    },
    WriteFile {
        path: String,
        #[serde(default)]
        content: String,
    },
    EditFile {
        path: String,
        #[serde(rename = "oldText")]
        old_text: String,
        #[serde(rename = "newText")]
        new_text: String,
    },
    ExecCmd {
        command: String,
        /// Requested timeout in seconds, capped by the constraints.
        #[serde(default)]
        timeout: Option<u64>,
    },
    Grep {
        pattern: String,
        #[serde(default = "default_path")]
        path: String,
    },
}

fn default_path() -> String {
    ".".into()
}

impl ToolCall {
    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::ListDir { .. } => ToolName::ListDir,
            ToolCall::ReadFile { .. } => ToolName::ReadFile,
            ToolCall::WriteFile { .. } => ToolName::WriteFile,
            ToolCall::EditFile { .. } => ToolName::EditFile,
            ToolCall::ExecCmd { .. } => ToolName::ExecCmd,
            ToolCall::Grep { .. } => ToolName::Grep,
        }
    }

    /// The argument object alone, as JSON. Used for audit entries and the
    /// `args_echo` field of results.
    pub fn args_value(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(mut map)) => {
                map.remove("args").unwrap_or(serde_json::Value::Null)
            }
            _ => serde_json::Value::Null,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserialize_read_file_call() {
        let call: ToolCall = serde_json::from_value(json!({
            "tool_name": "read_file",
            "args": {"path": "hello.txt"}
        }))
        .unwrap();
        assert_eq!(call.name(), ToolName::ReadFile);
        match call {
            ToolCall::ReadFile { path, offset, limit } => {
                assert_eq!(path, "hello.txt");
                assert_eq!(offset, 0);
                assert_eq!(limit, None);
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn deserialize_edit_file_camel_case_args() {
        let call: ToolCall = serde_json::from_value(json!({
            "tool_name": "edit_file",
            "args": {"path": "a.txt", "oldText": "foo", "newText": "bar"}
        }))
        .unwrap();
        match call {
            ToolCall::EditFile { old_text, new_text, .. } => {
                assert_eq!(old_text, "foo");
                assert_eq!(new_text, "bar");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_tool_name_fails() {
        let result: std::result::Result<ToolCall, _> = serde_json::from_value(json!({
            "tool_name": "launch_missiles",
            "args": {}
        }));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_arg_keys_are_dropped() {
        let call: ToolCall = serde_json::from_value(json!({
            "tool_name": "list_dir",
            "args": {"path": "src", "recursive": true}
        }))
        .unwrap();
        assert_eq!(call, ToolCall::ListDir { path: "src".into() });
    }

    #[test]
    fn list_dir_defaults_to_current_dir() {
        let call: ToolCall = serde_json::from_value(json!({
            "tool_name": "list_dir",
            "args": {}
        }))
        .unwrap();
        assert_eq!(call, ToolCall::ListDir { path: ".".into() });
    }

    #[test]
    fn args_value_echoes_arguments() {
        let call = ToolCall::ExecCmd {
            command: "ls -la".into(),
            timeout: Some(5),
        };
        let args = call.args_value();
        assert_eq!(args["command"], "ls -la");
        assert_eq!(args["timeout"], 5);
    }

    #[test]
    fn tool_name_round_trip() {
        for name in ToolName::ALL {
            assert_eq!(name.as_str().parse::<ToolName>().unwrap(), name);
        }
        assert!("nonexistent".parse::<ToolName>().is_err());
    }
}
