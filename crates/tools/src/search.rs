//! `grep` — substring search over a file or, recursively, a directory tree.

use crate::{constraint_to_tool_error, io_to_tool_error, RawOutput};
use opsloop_core::ToolError;
use opsloop_security::Constraints;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

pub(crate) async fn grep(
    constraints: &Constraints,
    pattern: &str,
    raw: &str,
) -> Result<RawOutput, ToolError> {
    if pattern.is_empty() {
        return Err(ToolError::BadArgs("pattern must not be empty".into()));
    }

    let path = constraints
        .validate_path(raw)
        .map_err(constraint_to_tool_error)?;

    let meta = tokio::fs::metadata(&path)
        .await
        .map_err(|e| io_to_tool_error(raw, e))?;

    let mut matches = Vec::new();
    if meta.is_file() {
        search_file(&path, pattern, constraints.allowed_root(), &mut matches).await;
    } else {
        // Breadth-first walk with sorted entries so output order is stable
        let mut queue = VecDeque::from([path]);
        while let Some(dir) = queue.pop_front() {
            let mut entries = Vec::new();
            let Ok(mut reader) = tokio::fs::read_dir(&dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = reader.next_entry().await {
                entries.push(entry.path());
            }
            entries.sort();
            for entry in entries {
                if entry.is_dir() {
                    queue.push_back(entry);
                } else {
                    search_file(&entry, pattern, constraints.allowed_root(), &mut matches).await;
                }
            }
        }
    }

    let output = if matches.is_empty() {
        "(no matches)".to_string()
    } else {
        matches.join("\n")
    };
    Ok(RawOutput::ok(output))
}

async fn search_file(path: &PathBuf, pattern: &str, root: &Path, matches: &mut Vec<String>) {
    // Unreadable and binary files are skipped silently
    let Ok(content) = tokio::fs::read_to_string(path).await else {
        return;
    };
    let display = path
        .strip_prefix(root)
        .unwrap_or(path.as_path())
        .to_string_lossy()
        .into_owned();
    for (idx, line) in content.lines().enumerate() {
        if line.contains(pattern) {
            matches.push(format!("{display}:{}: {}", idx + 1, line.trim_end()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints(root: &Path) -> Constraints {
        Constraints::new(root, Vec::new(), 30, 100_000, true).unwrap()
    }

    #[tokio::test]
    async fn single_file_search_has_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "alpha\nbeta\nalpha beta\n").unwrap();
        let c = constraints(dir.path());

        let out = grep(&c, "alpha", "f.txt").await.unwrap();
        let lines: Vec<&str> = out.output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("f.txt:1: "));
        assert!(lines[1].starts_with("f.txt:3: "));
    }

    #[tokio::test]
    async fn directory_search_is_recursive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        std::fs::write(dir.path().join("top.txt"), "needle here\n").unwrap();
        std::fs::write(dir.path().join("sub/deeper/low.txt"), "also a needle\n").unwrap();
        std::fs::write(dir.path().join("sub/other.txt"), "nothing\n").unwrap();
        let c = constraints(dir.path());

        let out = grep(&c, "needle", ".").await.unwrap();
        assert!(out.output.contains("top.txt:1:"));
        assert!(out.output.contains("sub/deeper/low.txt:1:"));
        assert!(!out.output.contains("other.txt"));
    }

    #[tokio::test]
    async fn no_matches_is_explicit() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.txt"), "nothing to see\n").unwrap();
        let c = constraints(dir.path());

        let out = grep(&c, "absent", ".").await.unwrap();
        assert_eq!(out.output, "(no matches)");
    }

    #[tokio::test]
    async fn binary_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bin.dat"), [0u8, 159, 146, 150]).unwrap();
        std::fs::write(dir.path().join("text.txt"), "match me\n").unwrap();
        let c = constraints(dir.path());

        let out = grep(&c, "match", ".").await.unwrap();
        assert!(out.output.contains("text.txt:1:"));
        assert!(!out.output.contains("bin.dat"));
    }

    #[tokio::test]
    async fn missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let c = constraints(dir.path());
        let err = grep(&c, "x", "absent_dir").await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
