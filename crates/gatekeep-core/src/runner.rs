//! Subprocess execution with a hard timeout.
//!
//! Spawn failures, timeouts and missing binaries come back as typed
//! `ExecutorError`s. A non-zero exit is not an error here; callers decide.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::domain::ExecutorError;

/// Captured result of one subprocess.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl CommandOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Run `argv` in `cwd`, killing it after `timeout_secs`.
pub async fn run_command(
    argv: &[String],
    cwd: &Path,
    timeout_secs: u64,
) -> Result<CommandOutput, ExecutorError> {
    let Some((exe, args)) = argv.split_first() else {
        return Err(ExecutorError::CommandNotFound {
            command: String::new(),
        });
    };
    let cmdline = argv.join(" ");
    let start = Instant::now();

    let child = Command::new(exe)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ExecutorError::CommandNotFound {
                    command: exe.clone(),
                }
            } else {
                ExecutorError::io(cwd, format!("failed to spawn `{cmdline}`: {e}"))
            }
        })?;

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output())
        .await
        .map_err(|_| ExecutorError::Timeout {
            command: cmdline.clone(),
            timeout_secs,
        })?
        .map_err(|e| ExecutorError::io(cwd, format!("`{cmdline}` failed: {e}")))?;

    let result = CommandOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms: start.elapsed().as_millis() as u64,
        success: output.status.success(),
    };
    tracing::debug!(
        command = %cmdline,
        exit_code = ?result.exit_code,
        duration_ms = result.duration_ms,
        "subprocess finished"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_simple_command() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command(&argv(&["echo", "hello"]), dir.path(), 30)
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.exit_code, Some(0));
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = run_command(&argv(&["sh", "-c", "echo oops >&2; exit 3"]), dir.path(), 30)
            .await
            .unwrap();
        assert!(!out.success);
        assert_eq!(out.exit_code, Some(3));
        assert!(out.combined().contains("oops"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_command(&argv(&["definitely-not-a-real-binary-xyz"]), dir.path(), 30)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::CommandNotFound { .. }));
    }

    #[tokio::test]
    async fn test_timeout_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_command(&argv(&["sleep", "5"]), dir.path(), 1)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ExecutorError::Timeout {
                command: "sleep 5".into(),
                timeout_secs: 1
            }
        );
    }

    #[tokio::test]
    async fn test_empty_argv_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(run_command(&[], dir.path(), 1).await.is_err());
    }
}
