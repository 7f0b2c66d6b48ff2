//! `git apply` integration for the diff executor.

use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::domain::ExecutorError;
use crate::runner::{run_command, CommandOutput};

/// Apply (or, with `check_only`, test-apply) a unified diff in `repo_root`.
///
/// `strip` is the `-p` level: 1 for `a/` `b/` prefixed headers, 0 otherwise.
/// A non-zero exit becomes `ApplyFailed` carrying stdout, stderr and the code.
pub async fn git_apply(
    repo_root: &Path,
    patch: &str,
    check_only: bool,
    strip: u8,
    timeout_secs: u64,
) -> Result<CommandOutput, ExecutorError> {
    let mut file = NamedTempFile::new().map_err(|e| ExecutorError::io("patch", e))?;
    file.write_all(patch.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|e| ExecutorError::io(file.path(), e))?;

    let mut argv = vec!["git".to_string(), "apply".to_string()];
    if check_only {
        argv.push("--check".to_string());
    }
    argv.push(format!("-p{strip}"));
    argv.push(file.path().display().to_string());

    let output = run_command(&argv, repo_root, timeout_secs).await?;
    if output.success {
        Ok(output)
    } else {
        Err(ExecutorError::ApplyFailed {
            command: if check_only {
                "git apply --check".to_string()
            } else {
                "git apply".to_string()
            },
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        std::fs::write(dir.path().join("a.txt"), "one\n").unwrap();
        run_git(dir.path(), &["add", "."]);
        run_git(dir.path(), &["commit", "-m", "initial"]);
        dir
    }

    const PATCH: &str = "--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-one\n+two\n";

    #[tokio::test]
    async fn test_check_only_leaves_tree_untouched() {
        let repo = make_git_repo();
        git_apply(repo.path(), PATCH, true, 1, 30).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(repo.path().join("a.txt")).unwrap(),
            "one\n"
        );
    }

    #[tokio::test]
    async fn test_apply_mutates_tree() {
        let repo = make_git_repo();
        git_apply(repo.path(), PATCH, false, 1, 30).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(repo.path().join("a.txt")).unwrap(),
            "two\n"
        );
    }

    #[tokio::test]
    async fn test_conflicting_patch_is_apply_failed() {
        let repo = make_git_repo();
        std::fs::write(repo.path().join("a.txt"), "something else\n").unwrap();
        let err = git_apply(repo.path(), PATCH, true, 1, 30).await.unwrap_err();
        assert!(matches!(err, ExecutorError::ApplyFailed { .. }));
    }
}
