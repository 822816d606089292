// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Job executor
//!
//! Runs the steps of one job instance in order inside a private workspace.
//! The first failing step ends the job. The job timeout bounds the whole
//! sequence, workspace seeding included.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::drift::compare;
use super::workspace::Workspace;
use super::{CommandRunner, CommandSpec};
use crate::cache::{CacheKey, CacheManager, Snapshot};
use crate::errors::CiflowError;
use crate::pipeline::{
    format_duration, log_tail, CacheSpec, CancelToken, DriftCheck, FailedStep, JobInstance,
    JobOutcome, JobResult, ResolvedStep, StepAction, StepRecord, EXCERPT_LINES,
};

/// Exit code reported when a step's shell could not be started
const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// How a single step ended
enum StepEnd {
    Passed(i32),
    Failed { exit_code: i32, detail: String },
}

/// Mutable state of a job in flight. Lives outside the timed future so it
/// survives a timeout.
#[derive(Default)]
struct JobProgress {
    log: String,
    steps: Vec<StepRecord>,
    current: Option<(usize, Instant)>,
}

impl JobProgress {
    fn line(&mut self, line: impl AsRef<str>) {
        self.log.push_str(line.as_ref());
        self.log.push('\n');
    }

    fn output(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.log.push_str(text);
        if !text.ends_with('\n') {
            self.log.push('\n');
        }
    }

    fn begin(&mut self, index: usize, step: &ResolvedStep) {
        self.line(format!("==> {}", step.name));
        self.current = Some((index, Instant::now()));
    }

    fn end(&mut self, steps: &[ResolvedStep], exit_code: Option<i32>) {
        if let Some((index, started)) = self.current.take() {
            let step = &steps[index];
            self.steps.push(StepRecord {
                id: step.id.clone(),
                name: step.name.clone(),
                kind: step.kind,
                exit_code,
                duration: started.elapsed(),
            });
        }
    }

    fn current_name(&self, steps: &[ResolvedStep]) -> Option<String> {
        self.current.map(|(index, _)| steps[index].name.clone())
    }
}

/// Executes job instances
pub struct JobExecutor {
    runner: Arc<dyn CommandRunner>,
    cache: CacheManager,
    /// Pristine source tree every workspace is seeded from
    source: PathBuf,
    exclude: Vec<PathBuf>,
}

impl JobExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, cache: CacheManager, source: PathBuf) -> Self {
        Self {
            runner,
            cache,
            source,
            exclude: Vec::new(),
        }
    }

    /// Leave `path` out of every workspace
    pub fn exclude(mut self, path: PathBuf) -> Self {
        self.exclude.push(path);
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Run one job instance to completion, timeout or cancellation
    pub async fn execute(&self, instance: &JobInstance, cancel: &CancelToken) -> JobResult {
        let started = Instant::now();
        let name = instance.display_name();
        let mut progress = JobProgress::default();

        info!("Job '{}' started", name);

        let outcome = if cancel.is_cancelled() {
            progress.line("Run cancelled before the job started");
            JobOutcome::Cancelled { step: None }
        } else {
            let timed = tokio::time::timeout(
                instance.timeout,
                self.run_steps(instance, cancel, &mut progress),
            )
            .await;

            match timed {
                Ok(outcome) => outcome,
                Err(_) => {
                    let step = progress.current_name(&instance.steps);
                    progress.end(&instance.steps, None);
                    if cancel.is_cancelled() {
                        progress.line("Run cancelled");
                        JobOutcome::Cancelled { step }
                    } else {
                        progress.line(format!(
                            "Job timed out after {}",
                            format_duration(instance.timeout)
                        ));
                        JobOutcome::TimedOut {
                            step,
                            after: instance.timeout,
                        }
                    }
                }
            }
        };

        let duration = started.elapsed();
        info!(
            "Job '{}' {} in {:.2}s",
            name,
            outcome.label(),
            duration.as_secs_f64()
        );

        JobResult {
            workflow: instance.workflow.clone(),
            job: instance.job.clone(),
            display_name: name,
            ordinal: instance.ordinal,
            assignment: instance.assignment.clone(),
            runs_on: instance.runs_on.clone(),
            outcome,
            duration,
            steps: progress.steps,
            log: progress.log,
        }
    }

    async fn run_steps(
        &self,
        instance: &JobInstance,
        cancel: &CancelToken,
        progress: &mut JobProgress,
    ) -> JobOutcome {
        let workspace = match self.prepare_workspace().await {
            Ok(workspace) => workspace,
            Err(e) => {
                progress.line(format!("Failed to prepare workspace: {}", e));
                return JobOutcome::Failure {
                    step: FailedStep {
                        id: "workspace".to_string(),
                        name: "Prepare workspace".to_string(),
                        kind: None,
                        detail: self.source.display().to_string(),
                    },
                    exit_code: -1,
                    log: log_tail(&progress.log, EXCERPT_LINES),
                };
            }
        };

        for (index, step) in instance.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                progress.line("Run cancelled");
                return JobOutcome::Cancelled { step: None };
            }

            progress.begin(index, step);
            let env = Self::step_env(instance, step, workspace.path());

            let end = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                end = self.run_step(instance, step, &env, workspace.path(), progress) => Some(end),
            };

            match end {
                None => {
                    progress.end(&instance.steps, None);
                    progress.line("Run cancelled");
                    return JobOutcome::Cancelled {
                        step: Some(step.name.clone()),
                    };
                }
                Some(StepEnd::Passed(exit_code)) => {
                    progress.end(&instance.steps, Some(exit_code));
                }
                Some(StepEnd::Failed { exit_code, detail }) => {
                    progress.end(&instance.steps, Some(exit_code));
                    return JobOutcome::Failure {
                        step: FailedStep {
                            id: step.id.clone(),
                            name: step.name.clone(),
                            kind: Some(step.kind),
                            detail,
                        },
                        exit_code,
                        log: log_tail(&progress.log, EXCERPT_LINES),
                    };
                }
            }
        }

        JobOutcome::Success
    }

    async fn prepare_workspace(&self) -> Result<Workspace, CiflowError> {
        let source = self.source.clone();
        let exclude = self.exclude.clone();
        tokio::task::spawn_blocking(move || Workspace::create(&source, &exclude))
            .await
            .map_err(|e| CiflowError::Worker {
                message: e.to_string(),
            })?
    }

    /// Step environment plus the variables every step can rely on
    fn step_env(
        instance: &JobInstance,
        step: &ResolvedStep,
        workspace: &Path,
    ) -> BTreeMap<String, String> {
        let mut env = step.env.clone();
        env.insert("CI".to_string(), "true".to_string());
        env.insert("CIFLOW".to_string(), "true".to_string());
        env.insert("CIFLOW_JOB".to_string(), instance.job.clone());
        env.insert(
            "CIFLOW_WORKSPACE".to_string(),
            workspace.display().to_string(),
        );
        env.insert("CIFLOW_RUNNER_OS".to_string(), instance.runs_on.clone());
        env
    }

    async fn run_step(
        &self,
        instance: &JobInstance,
        step: &ResolvedStep,
        env: &BTreeMap<String, String>,
        workspace: &Path,
        progress: &mut JobProgress,
    ) -> StepEnd {
        if instance.cache_enabled {
            for (name, spec) in step.inputs.iter() {
                self.restore_input(name, spec, workspace, progress).await;
            }
        }

        match &step.action {
            StepAction::Run(command) => {
                self.run_command(command, step.shell.clone(), env, workspace, progress)
                    .await
            }
            StepAction::SaveCache(spec) => {
                if instance.cache_enabled {
                    self.save_cache(spec, workspace, progress).await
                } else {
                    progress.line("Caching disabled, nothing saved");
                    StepEnd::Passed(0)
                }
            }
            StepAction::DriftCheck(check) => {
                self.drift_check(check, step.shell.clone(), env, workspace, progress)
                    .await
            }
        }
    }

    async fn run_command(
        &self,
        command: &str,
        shell: Option<String>,
        env: &BTreeMap<String, String>,
        workspace: &Path,
        progress: &mut JobProgress,
    ) -> StepEnd {
        let spec = CommandSpec {
            command: command.to_string(),
            shell,
            working_dir: workspace.to_path_buf(),
            env: env.clone(),
        };

        match self.runner.run(&spec).await {
            Ok(output) => {
                progress.output(&output.stdout);
                progress.output(&output.stderr);
                if output.success() {
                    StepEnd::Passed(output.exit_code)
                } else {
                    progress.line(format!("Process exited with code {}", output.exit_code));
                    StepEnd::Failed {
                        exit_code: output.exit_code,
                        detail: command.to_string(),
                    }
                }
            }
            Err(e) => {
                progress.line(e.to_string());
                StepEnd::Failed {
                    exit_code: SPAWN_FAILURE_EXIT_CODE,
                    detail: command.to_string(),
                }
            }
        }
    }

    /// Restore one cache input. Every problem degrades to a miss.
    async fn restore_input(
        &self,
        name: &str,
        spec: &CacheSpec,
        workspace: &Path,
        progress: &mut JobProgress,
    ) {
        let key = match CacheKey::derive(&spec.namespace, &spec.files, workspace) {
            Ok(key) => key,
            Err(e) => {
                warn!("Cannot derive cache key for input '{}': {}", name, e);
                progress.line(format!("Cache input '{}': {}", name, e));
                return;
            }
        };

        match self.cache.restore(&key).await {
            Ok(Some(snapshot)) => match snapshot.write_to(&workspace.join(&spec.path)) {
                Ok(()) => {
                    debug!("Restored {} into {}", key, spec.path.display());
                    progress.line(format!(
                        "Cache hit for '{}' ({}), restored {} file(s) into {}",
                        name,
                        key,
                        snapshot.len(),
                        spec.path.display()
                    ));
                }
                Err(e) => {
                    warn!("Failed to restore cache input '{}': {}", name, e);
                    progress.line(format!("Cache input '{}' not restored: {}", name, e));
                }
            },
            Ok(None) => {
                progress.line(format!("Cache miss for '{}' ({})", name, key));
            }
            Err(e) => {
                warn!("Cache lookup for '{}' failed: {}", name, e);
                progress.line(format!("Cache miss for '{}' ({}): {}", name, key, e));
            }
        }
    }

    async fn save_cache(
        &self,
        spec: &CacheSpec,
        workspace: &Path,
        progress: &mut JobProgress,
    ) -> StepEnd {
        let detail = spec.path.display().to_string();
        let fail = |progress: &mut JobProgress, message: String| {
            progress.line(message);
            StepEnd::Failed {
                exit_code: 1,
                detail: detail.clone(),
            }
        };

        let key = match CacheKey::derive(&spec.namespace, &spec.files, workspace) {
            Ok(key) => key,
            Err(e) => return fail(progress, format!("Cannot derive cache key: {}", e)),
        };

        let snapshot = match Snapshot::capture(&workspace.join(&spec.path)) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                return fail(
                    progress,
                    format!("Nothing to cache at '{}': {}", spec.path.display(), e),
                )
            }
        };

        // A store that cannot be written degrades to a warning; the job's
        // own work is unaffected.
        match self.cache.save(&key, &snapshot).await {
            Ok(()) => progress.line(format!(
                "Saved {} file(s) from {} as {}",
                snapshot.len(),
                spec.path.display(),
                key
            )),
            Err(e) => {
                warn!("Failed to save cache entry {}: {}", key, e);
                progress.line(format!("warning: cache entry {} not saved: {}", key, e));
            }
        }

        StepEnd::Passed(0)
    }

    async fn drift_check(
        &self,
        check: &DriftCheck,
        shell: Option<String>,
        env: &BTreeMap<String, String>,
        workspace: &Path,
        progress: &mut JobProgress,
    ) -> StepEnd {
        let detail = check.artifact.display().to_string();

        let committed = match read_optional(&self.source.join(&check.artifact)) {
            Ok(bytes) => bytes,
            Err(e) => {
                progress.line(e.to_string());
                return StepEnd::Failed {
                    exit_code: 1,
                    detail,
                };
            }
        };

        if let StepEnd::Failed { exit_code, .. } = self
            .run_command(&check.regenerate, shell, env, workspace, progress)
            .await
        {
            progress.line(format!("Regenerating {} failed", detail));
            return StepEnd::Failed { exit_code, detail };
        }

        let regenerated = match read_optional(&workspace.join(&check.artifact)) {
            Ok(bytes) => bytes,
            Err(e) => {
                progress.line(e.to_string());
                return StepEnd::Failed {
                    exit_code: 1,
                    detail,
                };
            }
        };

        let report = compare(&check.artifact, committed.as_deref(), regenerated.as_deref());
        progress.line(report.to_string());

        if report.is_clean() {
            StepEnd::Passed(0)
        } else {
            StepEnd::Failed {
                exit_code: 1,
                detail,
            }
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, CiflowError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CiflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}
