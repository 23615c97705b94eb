//! `exec_cmd` — shell command execution under the security envelope.
//!
//! Commands run through `sh -c` with the workspace as the working directory,
//! so pipes and redirects work; the allowlist therefore only vouches for the
//! first token (see `Constraints::validate_command`). Each command runs in
//! its own process group, and a timeout kills the whole group.

use crate::{constraint_to_tool_error, RawOutput};
use opsloop_core::ToolError;
use opsloop_security::Constraints;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, warn};

pub(crate) async fn exec_cmd(
    constraints: &Constraints,
    command: &str,
    requested_timeout: Option<u64>,
) -> Result<RawOutput, ToolError> {
    if !constraints.exec_enabled() {
        return Err(constraint_to_tool_error(
            opsloop_security::ConstraintError::ExecDisabled,
        ));
    }
    constraints
        .validate_command(command)
        .map_err(constraint_to_tool_error)?;

    let seconds = constraints.effective_timeout(requested_timeout);

    debug!(command = %command, timeout_sec = seconds, "Executing shell command");

    let mut cmd = tokio::process::Command::new("sh");
    cmd.args(["-c", command])
        .current_dir(constraints.allowed_root())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    configure_process_group(&mut cmd);

    let child = cmd
        .spawn()
        .map_err(|e| ToolError::IoFailure(format!("spawn failed: {e}")))?;
    let pid = child.id();

    match tokio::time::timeout(Duration::from_secs(seconds), child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

            let mut combined = stdout;
            if !stderr.is_empty() {
                combined.push_str("\n[stderr]\n");
                combined.push_str(&stderr);
            }

            // A signal-terminated process has no code; report -1 like a shell would
            let exit_code = output.status.code().unwrap_or(-1);
            Ok(RawOutput {
                output: combined,
                exit_code: Some(exit_code),
            })
        }
        Ok(Err(e)) => Err(ToolError::IoFailure(format!("wait failed: {e}"))),
        Err(_) => {
            warn!(command = %command, seconds, "Command timed out, killing process group");
            if let Some(pid) = pid {
                kill_process_group(pid);
            }
            Err(ToolError::Timeout { seconds })
        }
    }
}

/// Put the child in its own process group so a timeout can terminate the
/// full process tree, not just the shell.
#[cfg(unix)]
fn configure_process_group(cmd: &mut tokio::process::Command) {
    // SAFETY: pre_exec runs in the child after fork and before exec; setpgid
    // is async-signal-safe.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn configure_process_group(_cmd: &mut tokio::process::Command) {}

/// Send SIGKILL to the process group; fall back to the pid alone.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let raw = pid as libc::pid_t;
    unsafe {
        if libc::kill(-raw, libc::SIGKILL) != 0 {
            libc::kill(raw, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
