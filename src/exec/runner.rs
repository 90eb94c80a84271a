//! Runs an authorized command without a shell, under output and time limits.
//!
//! stdout and stderr share a single byte budget; a chunk that would cross it
//! is truncated to the exact remaining capacity and the child is killed. A
//! wall-clock timer kills the child when it fires. Both breaches surface as
//! violations, never as a normally-resolved result.

use crate::error::{Error, Result, Violation, ViolationCode};
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

const READ_CHUNK: usize = 8 * 1024;

/// Outcome of a completed (non-killed) command run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecOutcome {
    /// Child exit code; -1 when terminated by signal
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Always false under the reject-based contract; kept for the wire shape
    pub timed_out: bool,
    /// Always false under the reject-based contract; kept for the wire shape
    pub output_truncated: bool,
}

/// Spawn `command` with `args` in `cwd` and collect its output.
///
/// The child never goes through a shell and inherits only `PATH` from the
/// parent environment.
pub async fn run(
    command: &str,
    args: &[String],
    cwd: &Path,
    timeout: Duration,
    max_output_bytes: usize,
) -> Result<ExecOutcome> {
    let mut cmd = Command::new(command);
    cmd.args(args)
        .current_dir(cwd)
        .env_clear()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = std::env::var_os("PATH") {
        cmd.env("PATH", path);
    }

    debug!(command = %command, args = ?args, cwd = %cwd.display(), timeout_ms = timeout.as_millis() as u64, "spawning command");

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Spawn(format!("failed to spawn '{command}': {e}")))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| Error::Spawn("stdout pipe missing".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| Error::Spawn("stderr pipe missing".to_string()))?;

    let deadline = tokio::time::Instant::now() + timeout;
    let timer = tokio::time::sleep_until(deadline);
    tokio::pin!(timer);

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut remaining = max_output_bytes;
    let mut timed_out = false;
    let mut truncated = false;
    let mut stdout_open = true;
    let mut stderr_open = true;
    let mut stdout_buf = [0u8; READ_CHUNK];
    let mut stderr_buf = [0u8; READ_CHUNK];

    while stdout_open || stderr_open {
        tokio::select! {
            () = &mut timer => {
                timed_out = true;
                break;
            }
            read = stdout_pipe.read(&mut stdout_buf), if stdout_open => match read {
                Ok(0) | Err(_) => stdout_open = false,
                Ok(n) => {
                    if !append_within_budget(&mut stdout, &stdout_buf[..n], &mut remaining) {
                        truncated = true;
                        break;
                    }
                }
            },
            read = stderr_pipe.read(&mut stderr_buf), if stderr_open => match read {
                Ok(0) | Err(_) => stderr_open = false,
                Ok(n) => {
                    if !append_within_budget(&mut stderr, &stderr_buf[..n], &mut remaining) {
                        truncated = true;
                        break;
                    }
                }
            },
        }
    }

    let status = if timed_out || truncated {
        kill_and_reap(&mut child).await?
    } else {
        // Pipes closing does not imply exit; keep the same deadline for the wait
        match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => status.map_err(Error::Io)?,
            Err(_) => {
                timed_out = true;
                kill_and_reap(&mut child).await?
            }
        }
    };

    if timed_out {
        warn!(command = %command, timeout_ms = timeout.as_millis() as u64, "command timed out, killed");
        return Err(Violation::new(
            ViolationCode::Timeout,
            format!("command timed out after {}ms", timeout.as_millis()),
        )
        .with_details(serde_json::json!({ "command": command }))
        .into());
    }
    if truncated {
        warn!(command = %command, max_output_bytes, "output budget exceeded, killed");
        return Err(Violation::new(
            ViolationCode::OutputLimit,
            format!("command output exceeded {max_output_bytes} bytes"),
        )
        .with_details(serde_json::json!({ "command": command }))
        .into());
    }

    let exit_code = status.code().unwrap_or(-1);
    debug!(command = %command, exit_code, "command completed");
    Ok(ExecOutcome {
        exit_code,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        timed_out: false,
        output_truncated: false,
    })
}

/// Append `chunk` while the shared budget lasts.
///
/// A chunk that exactly fills the remaining capacity is accepted in full; a
/// chunk arriving after exhaustion, or crossing the boundary, trips the limit.
/// Returns false once the budget is breached.
fn append_within_budget(sink: &mut Vec<u8>, chunk: &[u8], remaining: &mut usize) -> bool {
    if *remaining == 0 {
        return false;
    }
    if chunk.len() <= *remaining {
        sink.extend_from_slice(chunk);
        *remaining -= chunk.len();
        true
    } else {
        sink.extend_from_slice(&chunk[..*remaining]);
        *remaining = 0;
        false
    }
}

async fn kill_and_reap(child: &mut Child) -> Result<std::process::ExitStatus> {
    // SIGKILL; start_kill only errors if the child is already gone
    let _ = child.start_kill();
    child.wait().await.map_err(Error::Io)
}
