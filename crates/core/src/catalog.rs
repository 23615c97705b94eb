//! The tool catalogue — single source of truth for tool descriptors.
//!
//! Both the structured-tool channel payload and the system-prompt rendering
//! are computed from this list. Duplicating a description anywhere else is a
//! defect.

use crate::call::ToolName;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A tool descriptor sent to the LLM so it knows what tools it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The ordered catalogue of the six tool primitives.
pub fn catalog() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: ToolName::ListDir.to_string(),
            description: "List files and directories. Directories carry a trailing '/'.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "Directory path (default: workspace root)" }
                },
                "required": []
            }),
        },
        ToolDescriptor {
            name: ToolName::ReadFile.to_string(),
            description: "Read file contents, optionally from a line offset up to a line limit.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path" },
                    "offset": { "type": "integer", "description": "Optional: 0-based starting line" },
                    "limit": { "type": "integer", "description": "Optional: maximum lines to read" }
                },
                "required": ["path"]
            }),
        },
        ToolDescriptor {
            name: ToolName::WriteFile.to_string(),
            description: "Write or create a file, creating parent directories as needed.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path" },
                    "content": { "type": "string", "description": "Content to write" }
                },
                "required": ["path", "content"]
            }),
        },
        ToolDescriptor {
            name: ToolName::EditFile.to_string(),
            description: "Edit a file by replacing text. oldText must appear exactly once.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string", "description": "File path" },
                    "oldText": { "type": "string", "description": "Text to find (must be unique)" },
                    "newText": { "type": "string", "description": "Text to replace with" }
                },
                "required": ["path", "oldText", "newText"]
            }),
        },
        ToolDescriptor {
            name: ToolName::ExecCmd.to_string(),
            description: "Execute a shell command in the workspace and return stdout/stderr.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Shell command to execute" },
                    "timeout": { "type": "integer", "description": "Optional: timeout in seconds" }
                },
                "required": ["command"]
            }),
        },
        ToolDescriptor {
            name: ToolName::Grep.to_string(),
            description: "Search for text in a file or recursively in a directory.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string", "description": "Text pattern to search for" },
                    "path": { "type": "string", "description": "File or directory path (default: workspace root)" }
                },
                "required": ["pattern"]
            }),
        },
    ]
}

/// Render the catalogue as numbered plain text for system prompts.
pub fn render_catalog() -> String {
    let mut lines = Vec::new();
    for (i, tool) in catalog().iter().enumerate() {
        lines.push(format!("{}. {}", i + 1, tool.name));
        lines.push(format!("   Description: {}", tool.description));
        lines.push(format!("   Args: {}", tool.parameters["properties"]));
    }
    lines.join("\n")
}
