//! Filesystem tool primitives: `list_dir`, `read_file`, `write_file`,
//! `edit_file`. Every path argument is validated against the constraints
//! before anything touches the filesystem.

use crate::{constraint_to_tool_error, io_to_tool_error, RawOutput};
use opsloop_core::ToolError;
use opsloop_security::Constraints;

/// List directory entries, one per line, directories with a trailing `/`.
pub(crate) async fn list_dir(constraints: &Constraints, raw: &str) -> Result<RawOutput, ToolError> {
    let path = constraints
        .validate_path(raw)
        .map_err(constraint_to_tool_error)?;

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| io_to_tool_error(raw, e))?;
    if !meta.is_dir() {
        return Err(ToolError::BadArgs(format!("not a directory: {raw}")));
    }

    let mut entries = Vec::new();
    let mut reader = tokio::fs::read_dir(&path)
        .await
        .map_err(|e| io_to_tool_error(raw, e))?;
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| io_to_tool_error(raw, e))?
    {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        entries.push(if is_dir { format!("{name}/") } else { name });
    }
    entries.sort();

    Ok(RawOutput::ok(entries.join("\n")))
}

/// Read file contents from a 0-based line offset, up to `limit` lines.
pub(crate) async fn read_file(
    constraints: &Constraints,
    raw: &str,
    offset: usize,
    limit: Option<usize>,
) -> Result<RawOutput, ToolError> {
    let path = constraints
        .validate_path(raw)
        .map_err(constraint_to_tool_error)?;

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| io_to_tool_error(raw, e))?;

    let selected: Vec<&str> = match limit {
        Some(limit) => content.lines().skip(offset).take(limit).collect(),
        None => content.lines().skip(offset).collect(),
    };

    Ok(RawOutput::ok(selected.join("\n")))
}

/// Write a file, creating parent directories. Reports bytes written.
pub(crate) async fn write_file(
    constraints: &Constraints,
    raw: &str,
    content: &str,
) -> Result<RawOutput, ToolError> {
    let path = constraints
        .validate_path(raw)
        .map_err(constraint_to_tool_error)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_to_tool_error(raw, e))?;
    }

    tokio::fs::write(&path, content)
        .await
        .map_err(|e| io_to_tool_error(raw, e))?;

    Ok(RawOutput::ok(format!(
        "Wrote {} bytes to {raw}",
        content.len()
    )))
}

/// Replace `old_text` with `new_text`. Fails unless `old_text` appears
/// exactly once.
pub(crate) async fn edit_file(
    constraints: &Constraints,
    raw: &str,
    old_text: &str,
    new_text: &str,
) -> Result<RawOutput, ToolError> {
    if old_text.is_empty() {
        return Err(ToolError::BadArgs("oldText must not be empty".into()));
    }

    let path = constraints
        .validate_path(raw)
        .map_err(constraint_to_tool_error)?;

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| io_to_tool_error(raw, e))?;

    let occurrences = content.matches(old_text).count();
    if occurrences == 0 {
        return Err(ToolError::BadArgs(format!("text not found in {raw}")));
    }
    if occurrences > 1 {
        return Err(ToolError::BadArgs(format!(
            "text appears {occurrences} times in {raw} (must be unique)"
        )));
    }

    let updated = content.replacen(old_text, new_text, 1);
    tokio::fs::write(&path, updated)
        .await
        .map_err(|e| io_to_tool_error(raw, e))?;

    Ok(RawOutput::ok(format!("Edited {raw}")))
}
