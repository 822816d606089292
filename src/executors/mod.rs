// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Job execution
//!
//! [`CommandRunner`] is the seam to the outside world: compilers, linters
//! and everything else a step invokes are reached through it.
//! [`JobExecutor`] runs one job instance's steps on top of it.

mod drift;
mod job;
mod shell;
mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use drift::{compare, ByteDifference, DriftReport, LineChange, MAX_LISTED_LINES};
pub use job::JobExecutor;
pub use shell::ShellRunner;
pub use workspace::Workspace;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::CiflowResult;

/// A command to run inside a job workspace
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: String,
    /// Shell override; the runner's default when `None`
    pub shell: Option<String>,
    pub working_dir: PathBuf,
    /// Variables added to the inherited process environment
    pub env: BTreeMap<String, String>,
}

/// Output of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `-1` when the process was killed by a signal
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for command runners.
///
/// Dropping the returned future must stop the command; timeouts and
/// cancellation rely on it.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion
    async fn run(&self, spec: &CommandSpec) -> CiflowResult<CommandOutput>;
}
