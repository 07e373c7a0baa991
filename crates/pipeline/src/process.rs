//! External tool invocation.
//!
//! [`run_tool`] spawns a binary with stdin closed, captures its output and
//! enforces a hard timeout. The child is spawned with `kill_on_drop`, so a
//! timeout or a cancelled caller (the future being dropped) kills it.

use std::ffi::{OsStr, OsString};
use std::io;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Cap on captured stdout (ffprobe JSON fits comfortably).
const MAX_STDOUT_BYTES: usize = 1024 * 1024;

/// Cap on captured stderr. Anything past it is read and discarded.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// Characters of stderr kept in error values and logs.
const STDERR_EXCERPT_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The binary could not be started (missing, not executable).
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out after {elapsed_ms}ms")]
    Timeout { program: String, elapsed_ms: u64 },

    #[error("{program} exited with code {code}: {stderr}")]
    Exit {
        program: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    /// Spawn failures say nothing about the input and never merit a retry.
    pub fn is_spawn(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}

/// Run `program` with `args`, failing on non-zero exit or after `timeout`.
pub async fn run_tool(
    program: &OsStr,
    args: &[OsString],
    timeout: Duration,
) -> Result<ToolOutput, ToolError> {
    let name = program.to_string_lossy().to_string();

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
        program: name.clone(),
        source,
    })?;

    // Drain both pipes concurrently so a chatty child never blocks on a
    // full pipe while we wait for it.
    let stdout_task = tokio::spawn(read_stream(child.stdout.take(), MAX_STDOUT_BYTES));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take(), MAX_STDERR_BYTES));

    let status = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(source)) => {
            return Err(ToolError::Wait {
                program: name,
                source,
            })
        }
        Err(_elapsed) => {
            // Dropping `child` kills the process.
            return Err(ToolError::Timeout {
                program: name,
                elapsed_ms: start.elapsed().as_millis() as u64,
            });
        }
    };

    let stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
    let stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();
    let duration_ms = start.elapsed().as_millis() as u64;

    if !status.success() {
        return Err(ToolError::Exit {
            program: name,
            code: status.code().unwrap_or(-1),
            stderr: excerpt(&stderr),
        });
    }

    Ok(ToolOutput {
        stdout,
        stderr,
        duration_ms,
    })
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>, limit: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(limit as u64).read_to_end(&mut buf).await;
        // Keep the pipe empty until the child closes it.
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

/// Last [`STDERR_EXCERPT_CHARS`] characters of trimmed stderr.
fn excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - STDERR_EXCERPT_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn args(items: &[&str]) -> Vec<OsString> {
        items.iter().map(OsString::from).collect()
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let err = run_tool(
            OsStr::new("definitely-not-a-real-binary-4f1c"),
            &[],
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(err.is_spawn());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout() {
        let out = run_tool(OsStr::new("sh"), &args(&["-c", "echo hello"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let err = run_tool(
            OsStr::new("sh"),
            &args(&["-c", "echo broken >&2; exit 3"]),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert_matches!(err, ToolError::Exit { code: 3, stderr, .. } if stderr == "broken");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_child() {
        let err = run_tool(
            OsStr::new("sh"),
            &args(&["-c", "sleep 5"]),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert_matches!(err, ToolError::Timeout { .. });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn output_past_the_cap_does_not_stall_child() {
        let script = format!("head -c {} /dev/zero >&2", MAX_STDERR_BYTES * 4);
        let out = run_tool(OsStr::new("sh"), &args(&["-c", &script]), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(out.stderr.len(), MAX_STDERR_BYTES);
    }

    #[test]
    fn excerpt_keeps_tail() {
        let long = "x".repeat(600) + "END";
        let cut = excerpt(&long);
        assert_eq!(cut.chars().count(), STDERR_EXCERPT_CHARS);
        assert!(cut.ends_with("END"));
    }
}
