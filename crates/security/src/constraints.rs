//! Constraints — pure validators enforcing the security envelope.
//!
//! Every tool call passes through these checks: path confinement to the
//! allowed root, first-token command allowlisting, timeout capping, and
//! centre-cut output truncation. Validators are side-effect free; callers
//! convert failures into failed tool results.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Slack allowed above the cap when recognising an already-truncated string.
/// Covers the marker line (`\n... (N chars hidden) ...\n`) at any realistic N.
const MARKER_SLACK: usize = 64;

#[derive(Debug, Clone, Error)]
pub enum ConstraintError {
    #[error("path outside allowed root: {path}")]
    PathOutsideRoot { path: String },

    #[error("cannot resolve path {path}: {reason}")]
    CannotResolve { path: String, reason: String },

    #[error("command not allowed: {command}")]
    CommandNotAllowed { command: String },

    #[error("command contains shell metacharacters: {command}")]
    ShellMetacharacters { command: String },

    #[error("command execution is disabled")]
    ExecDisabled,
}

/// The immutable security envelope applied to every tool call.
#[derive(Debug, Clone)]
pub struct Constraints {
    allowed_root: PathBuf,
    command_allowlist: BTreeSet<String>,
    timeout_sec: u64,
    max_output_size: usize,
    exec_enabled: bool,
}

impl Constraints {
    /// Build the envelope. Creates and canonicalises the allowed root so
    /// later prefix checks compare resolved paths.
    pub fn new(
        allowed_root: impl AsRef<Path>,
        command_allowlist: impl IntoIterator<Item = String>,
        timeout_sec: u64,
        max_output_size: usize,
        exec_enabled: bool,
    ) -> std::io::Result<Self> {
        let root = allowed_root.as_ref();
        std::fs::create_dir_all(root)?;
        Ok(Self {
            allowed_root: root.canonicalize()?,
            command_allowlist: command_allowlist.into_iter().collect(),
            timeout_sec,
            max_output_size,
            exec_enabled,
        })
    }

    pub fn allowed_root(&self) -> &Path {
        &self.allowed_root
    }

    pub fn max_output_size(&self) -> usize {
        self.max_output_size
    }

    pub fn exec_enabled(&self) -> bool {
        self.exec_enabled
    }

    /// Validate that a path stays inside the allowed root.
    ///
    /// Relative paths resolve against the root; absolute paths are taken as
    /// given. The result is canonicalised (symlinks and `..` resolved to
    /// their final target) and must be a descendant of the canonical root.
    /// A root of `/` accepts every path.
    ///
    /// Returns the canonical path for the tool to operate on.
    pub fn validate_path(&self, raw: &str) -> Result<PathBuf, ConstraintError> {
        let joined = if Path::new(raw).is_absolute() {
            PathBuf::from(raw)
        } else {
            self.allowed_root.join(raw)
        };

        let canonical =
            canonicalize_allowing_absent(&joined).map_err(|e| ConstraintError::CannotResolve {
                path: raw.into(),
                reason: e.to_string(),
            })?;

        if self.allowed_root == Path::new("/") || canonical.starts_with(&self.allowed_root) {
            Ok(canonical)
        } else {
            Err(ConstraintError::PathOutsideRoot { path: raw.into() })
        }
    }

    /// Validate a shell command against the allowlist.
    ///
    /// Only the first whitespace token is inspected; an empty allowlist
    /// accepts everything. With a non-empty allowlist, commands carrying
    /// shell metacharacters (`;`, `|`, `&`, `` ` ``, `$(`) are refused as
    /// well, since `exec_cmd` runs through a shell and the first token alone
    /// cannot vouch for a compound command.
    pub fn validate_command(&self, command: &str) -> Result<(), ConstraintError> {
        if self.command_allowlist.is_empty() {
            return Ok(());
        }

        let first = command.split_whitespace().next().unwrap_or("");
        if first.is_empty() {
            return Err(ConstraintError::CommandNotAllowed {
                command: command.into(),
            });
        }

        if command.contains(';')
            || command.contains('|')
            || command.contains('&')
            || command.contains('`')
            || command.contains("$(")
        {
            return Err(ConstraintError::ShellMetacharacters {
                command: command.into(),
            });
        }

        if self.command_allowlist.contains(first) {
            Ok(())
        } else {
            Err(ConstraintError::CommandNotAllowed {
                command: first.into(),
            })
        }
    }

    /// The timeout actually applied: the requested one, capped by the
    /// configured maximum.
    pub fn effective_timeout(&self, requested: Option<u64>) -> u64 {
        match requested {
            Some(r) => r.min(self.timeout_sec),
            None => self.timeout_sec,
        }
    }

    /// Truncate with the configured cap.
    pub fn truncate_output(&self, output: &str) -> String {
        truncate_output(output, self.max_output_size)
    }
}

/// Centre-cut truncation: keep the first and last `cap / 2` characters and
/// replace the middle with a marker naming how many characters were hidden.
/// Diagnostic text at either end of the output survives.
///
/// Idempotent: re-truncating an already-truncated string returns it
/// unchanged.
pub fn truncate_output(output: &str, cap: usize) -> String {
    let total = output.chars().count();
    if total <= cap {
        return output.to_string();
    }

    // A previously truncated string is at most the cap plus the marker line;
    // recognise it and pass it through so the operation is idempotent.
    if total <= cap + MARKER_SLACK && output.contains(" chars hidden) ...") {
        return output.to_string();
    }

    let keep = cap / 2;
    let hidden = total - cap;

    let prefix_end = output
        .char_indices()
        .nth(keep)
        .map(|(i, _)| i)
        .unwrap_or(output.len());
    let suffix_start = output
        .char_indices()
        .nth(total - keep)
        .map(|(i, _)| i)
        .unwrap_or(output.len());

    format!(
        "{}\n... ({hidden} chars hidden) ...\n{}",
        &output[..prefix_end],
        &output[suffix_start..]
    )
}

/// Canonicalise a path that may not exist yet (e.g. a `write_file` target):
/// canonicalise the deepest existing ancestor, then re-apply the remaining
/// components, resolving `.` and `..` lexically on the canonical base.
fn canonicalize_allowing_absent(path: &Path) -> std::io::Result<PathBuf> {
    if path.exists() {
        return path.canonicalize();
    }

    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();
    while !existing.exists() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for name in tail.into_iter().rev() {
        match Path::new(&name).components().next() {
            Some(Component::ParentDir) => {
                resolved.pop();
            }
            Some(Component::CurDir) | None => {}
            _ => resolved.push(name),
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constraints_at(root: &Path) -> Constraints {
        Constraints::new(root, Vec::new(), 30, 1000, true).unwrap()
    }

    #[test]
    fn relative_path_resolves_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();
        let c = constraints_at(dir.path());

        let resolved = c.validate_path("hello.txt").unwrap();
        assert!(resolved.starts_with(c.allowed_root()));
        assert!(resolved.ends_with("hello.txt"));
    }

    #[test]
    fn traversal_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let c = constraints_at(dir.path());

        let err = c.validate_path("../../etc/passwd").unwrap_err();
        assert!(err.to_string().contains("path outside allowed root"));
    }

    #[test]
    fn absolute_path_outside_root_is_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let c = constraints_at(dir.path());
        assert!(c.validate_path("/etc/passwd").is_err());
    }

    #[test]
    fn root_slash_accepts_everything() {
        let c = Constraints::new("/", Vec::new(), 30, 1000, true).unwrap();
        assert!(c.validate_path("/etc/passwd").is_ok());
        assert!(c.validate_path("anything/at/all").is_ok());
    }

    #[test]
    fn accepted_paths_have_root_prefix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let c = constraints_at(dir.path());

        for p in ["sub", "sub/new_file.txt", "./sub/../sub"] {
            let resolved = c.validate_path(p).unwrap();
            assert!(
                resolved.starts_with(c.allowed_root()),
                "{p} resolved outside root: {}",
                resolved.display()
            );
        }
    }

    #[test]
    fn absent_file_traversal_still_blocked() {
        let dir = tempfile::tempdir().unwrap();
        let c = constraints_at(dir.path());
        // The file does not exist, but the `..` components must still resolve
        assert!(c.validate_path("missing/../../outside.txt").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_blocked() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("escape")).unwrap();
        let c = constraints_at(dir.path());
        assert!(c.validate_path("escape").is_err());
    }

    #[test]
    fn empty_allowlist_accepts_all_commands() {
        let dir = tempfile::tempdir().unwrap();
        let c = constraints_at(dir.path());
        assert!(c.validate_command("rm -rf /").is_ok());
    }

    #[test]
    fn allowlist_checks_first_token() {
        let dir = tempfile::tempdir().unwrap();
        let c = Constraints::new(
            dir.path(),
            vec!["ls".into(), "cat".into()],
            30,
            1000,
            true,
        )
        .unwrap();

        assert!(c.validate_command("ls -la").is_ok());
        assert!(c.validate_command("cat file.txt").is_ok());

        let err = c.validate_command("rm temp.log").unwrap_err();
        assert!(err.to_string().contains("rm"));
    }

    #[test]
    fn metacharacters_rejected_under_allowlist() {
        let dir = tempfile::tempdir().unwrap();
        let c = Constraints::new(dir.path(), vec!["ls".into()], 30, 1000, true).unwrap();

        for cmd in ["ls && rm -rf /", "ls; rm x", "ls | sh", "ls `whoami`", "ls $(id)"] {
            assert!(c.validate_command(cmd).is_err(), "{cmd} should be refused");
        }
    }

    #[test]
    fn effective_timeout_takes_minimum() {
        let dir = tempfile::tempdir().unwrap();
        let c = constraints_at(dir.path());
        assert_eq!(c.effective_timeout(None), 30);
        assert_eq!(c.effective_timeout(Some(10)), 10);
        assert_eq!(c.effective_timeout(Some(300)), 30);
    }

    #[test]
    fn short_output_is_unchanged() {
        assert_eq!(truncate_output("hello", 1000), "hello");
    }

    #[test]
    fn long_output_is_centre_cut() {
        let input: String = "abcdefghij".repeat(1000); // 10_000 chars
        let out = truncate_output(&input, 1000);

        assert!(out.contains("... (9000 chars hidden) ..."));
        assert!(out.starts_with(&input[..500]));
        assert!(out.ends_with(&input[input.len() - 500..]));
    }

    #[test]
    fn truncation_is_idempotent() {
        let input: String = "x".repeat(10_000);
        let once = truncate_output(&input, 1000);
        let twice = truncate_output(&once, 1000);
        assert_eq!(once, twice);
    }

    #[test]
    fn truncation_is_bounded() {
        let input: String = "y".repeat(50_000);
        let out = truncate_output(&input, 2000);
        assert!(out.chars().count() <= 2000 + MARKER_SLACK);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let input: String = "héllo wörld ".repeat(200);
        let out = truncate_output(&input, 100);
        assert!(out.contains("chars hidden"));
        // Slicing on a non-boundary would have panicked above
        assert!(!out.is_empty());
    }
}
