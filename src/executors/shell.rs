// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Shell command runner

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::errors::{CiflowError, CiflowResult};

/// Runs step commands through `<shell> -c`
pub struct ShellRunner {
    default_shell: String,
}

impl ShellRunner {
    /// Use `bash` when it is on PATH, `sh` otherwise
    pub fn new() -> Self {
        let default_shell = if which::which("bash").is_ok() {
            "bash"
        } else {
            "sh"
        };

        Self {
            default_shell: default_shell.to_string(),
        }
    }

    /// Use a specific default shell
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            default_shell: shell.into(),
        }
    }

    pub fn default_shell(&self) -> &str {
        &self.default_shell
    }

    fn build_command(shell: &str, spec: &CommandSpec) -> Command {
        let mut cmd = Command::new(shell);

        // bash fails a step on the first failing command, including inside pipelines
        if shell == "bash" || shell.ends_with("/bash") {
            cmd.args(["--noprofile", "--norc", "-eo", "pipefail"]);
        } else {
            cmd.arg("-e");
        }

        cmd.arg("-c").arg(&spec.command);
        cmd.current_dir(&spec.working_dir);
        cmd.envs(&spec.env);
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

/// Kills every process left in a step's process group when dropped.
///
/// The shell leads its own group, so subshells, pipeline stages and
/// anything else it forked end with the step, whether it finished or its
/// future was dropped on timeout or cancellation.
struct ProcessGroup(Option<u32>);

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        if let Some(id) = self.0 {
            kill_group(id);
        }
    }
}

#[cfg(unix)]
fn kill_group(id: u32) {
    // SAFETY: killpg has no memory-safety preconditions. A group with no
    // processes left yields ESRCH, which is ignored.
    if unsafe { libc::killpg(id as libc::pid_t, libc::SIGKILL) } == 0 {
        debug!("Killed process group {}", id);
    }
}

#[cfg(not(unix))]
fn kill_group(_id: u32) {}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, spec: &CommandSpec) -> CiflowResult<CommandOutput> {
        let shell = spec.shell.as_deref().unwrap_or(&self.default_shell);
        debug!("{} -c {}", shell, spec.command);

        let spawn_failed = |e: std::io::Error| CiflowError::SpawnFailed {
            shell: shell.to_string(),
            error: e.to_string(),
            help: Some(format!("Shell '{}' may not be available", shell)),
        };

        let start = Instant::now();
        let mut cmd = Self::build_command(shell, spec);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        let child = cmd.spawn().map_err(spawn_failed)?;

        let _group = ProcessGroup(child.id());
        let output = child.wait_with_output().await.map_err(spawn_failed)?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tempfile::TempDir;

    fn spec(command: &str, dir: &TempDir) -> CommandSpec {
        CommandSpec {
            command: command.to_string(),
            shell: None,
            working_dir: dir.path().to_path_buf(),
            env: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_execute_simple_command() {
        let dir = TempDir::new().unwrap();
        let output = ShellRunner::new().run(&spec("echo hello", &dir)).await.unwrap();

        assert!(output.success());
        assert!(output.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_exit_code_and_env() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec("echo \"$GREETING\" >&2; exit 3", &dir);
        spec.env.insert("GREETING".into(), "hi there".into());

        let output = ShellRunner::new().run(&spec).await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr.trim(), "hi there");
    }

    #[tokio::test]
    async fn test_runs_in_working_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker"), "x").unwrap();

        let output = ShellRunner::with_shell("sh")
            .run(&spec("ls", &dir))
            .await
            .unwrap();
        assert!(output.stdout.contains("marker"));
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let dir = TempDir::new().unwrap();
        let mut spec = spec("true", &dir);
        spec.shell = Some("definitely-not-a-shell-ciflow".into());

        let err = ShellRunner::new().run(&spec).await.unwrap_err();
        assert!(matches!(err, CiflowError::SpawnFailed { .. }));
    }

    #[tokio::test]
    async fn test_dropping_future_stops_command() {
        let dir = TempDir::new().unwrap();
        let runner = ShellRunner::new();
        let spec = spec("sleep 5; touch finished", &dir);

        let started = Instant::now();
        let result = tokio::time::timeout(Duration::from_millis(200), runner.run(&spec)).await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(2));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!dir.path().join("finished").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropping_future_stops_forked_children() {
        let dir = TempDir::new().unwrap();
        let runner = ShellRunner::new();
        let spec = spec("(sleep 1; touch finished); true", &dir);

        let result = tokio::time::timeout(Duration::from_millis(300), runner.run(&spec)).await;
        assert!(result.is_err());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("finished").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_leftovers_are_killed_after_step() {
        let dir = TempDir::new().unwrap();
        let spec = spec("(sleep 1; touch finished) >/dev/null 2>&1 &", &dir);

        let output = ShellRunner::new().run(&spec).await.unwrap();
        assert!(output.success());

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("finished").exists());
    }
}
