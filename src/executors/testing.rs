// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Scripted command runner for tests

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{CommandOutput, CommandRunner, CommandSpec};
use crate::errors::CiflowResult;

/// Answers from a script instead of spawning processes. Every command
/// exits 0 unless scripted otherwise.
#[derive(Default)]
pub(crate) struct ScriptedRunner {
    exit_codes: BTreeMap<String, i32>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRunner {
    pub(crate) fn failing(command: &str, exit_code: i32) -> Self {
        let mut runner = Self::default();
        runner.exit_codes.insert(command.to_string(), exit_code);
        runner
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of commands seen running at once
    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> CiflowResult<CommandOutput> {
        self.calls.lock().unwrap().push(spec.command.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        Ok(CommandOutput {
            exit_code: self.exit_codes.get(&spec.command).copied().unwrap_or(0),
            stdout: format!("ran {}\n", spec.command),
            stderr: String::new(),
            duration: self.delay,
        })
    }
}
