// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Pipeline runner
//!
//! Coordinates a run: trigger evaluation, expansion of every matched
//! workflow, a bounded pool of concurrent jobs and aggregation of their
//! results. Configuration problems abort before any job starts; job-level
//! problems are collected into the verdict.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::aggregate::{serialize_millis, JobResult, PipelineVerdict, ResultAggregator};
use super::cancel::CancelToken;
use super::definition::PipelineDefinition;
use super::matrix::{JobInstance, MatrixExpander};
use super::trigger::{Event, TriggerEvaluator};
use super::validation::{PipelineValidator, ValidationResult};
use crate::errors::{CiflowError, CiflowResult};
use crate::executors::JobExecutor;

/// Exit code: success, or nothing triggered
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code: at least one job did not succeed
pub const EXIT_FAILURE: i32 = 1;
/// Exit code: configuration error, nothing ran
pub const EXIT_CONFIGURATION: i32 = 2;
/// Exit code: the engine itself failed, e.g. a worker task or the cache store
pub const EXIT_INTERNAL: i32 = 3;

/// A validated workflow with its triggers compiled
pub struct PreparedPipeline {
    pub definition: PipelineDefinition,
    /// File the workflow was loaded from
    pub source: Option<PathBuf>,
    pub validation: ValidationResult,
    triggers: TriggerEvaluator,
}

impl PreparedPipeline {
    /// Load, validate and compile a workflow file
    pub fn load(path: &Path) -> CiflowResult<Self> {
        let definition = PipelineDefinition::from_file(path)?;
        let mut prepared = Self::prepare(definition)?;
        prepared.source = Some(path.to_path_buf());
        Ok(prepared)
    }

    /// Validate and compile an already parsed workflow
    pub fn prepare(definition: PipelineDefinition) -> CiflowResult<Self> {
        let validation = PipelineValidator::ensure_valid(&definition)?;
        let triggers = TriggerEvaluator::new(&definition.triggers)?;

        Ok(Self {
            definition,
            source: None,
            validation,
            triggers,
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.triggers.matches(event)
    }

    /// Every job instance of this workflow, numbered from `first_ordinal`
    pub fn instances(&self, first_ordinal: usize) -> CiflowResult<Vec<JobInstance>> {
        let mut instances = Vec::new();
        for (name, template) in self.definition.jobs.iter() {
            if MatrixExpander::count(template) == 0 {
                return Err(CiflowError::EmptyExpansion {
                    job: name.to_string(),
                });
            }
            let next = first_ordinal + instances.len();
            instances.extend(MatrixExpander::instances(&self.definition, name, template, next));
        }
        Ok(instances)
    }
}

/// Progress notifications emitted while a run is in flight
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Jobs are about to be scheduled
    Planned { total: usize, concurrency: usize },
    JobStarted { ordinal: usize, name: String },
    JobFinished { ordinal: usize, name: String, success: bool, label: &'static str },
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Run options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Maximum concurrently running jobs; overrides the workflows' own limit
    pub concurrency: Option<usize>,
    pub progress: Option<ProgressSender>,
}

/// Overall status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No workflow matched the event; nothing ran
    NotTriggered,
    Success,
    Failure,
}

/// Everything a run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub event: Event,
    pub status: RunStatus,
    /// Workflows whose triggers matched
    pub matched: Vec<String>,
    /// Workflows whose triggers did not match
    pub skipped: Vec<String>,
    pub concurrency: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub verdict: Option<PipelineVerdict>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        match self.status {
            RunStatus::NotTriggered | RunStatus::Success => EXIT_SUCCESS,
            RunStatus::Failure => EXIT_FAILURE,
        }
    }

    pub fn results(&self) -> &[JobResult] {
        self.verdict.as_ref().map_or(&[], |v| v.results.as_slice())
    }
}

/// Coordinates runs
pub struct PipelineRunner {
    executor: Arc<JobExecutor>,
    options: RunOptions,
}

impl PipelineRunner {
    pub fn new(executor: JobExecutor, options: RunOptions) -> Self {
        Self {
            executor: Arc::new(executor),
            options,
        }
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(tx) = &self.options.progress {
            let _ = tx.send(event);
        }
    }

    fn concurrency(&self, matched: &[&PreparedPipeline]) -> usize {
        self.options
            .concurrency
            .or_else(|| matched.iter().filter_map(|p| p.definition.concurrency).min())
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Run every workflow the event triggers
    pub async fn run(
        &self,
        pipelines: &[PreparedPipeline],
        event: &Event,
        cancel: &CancelToken,
    ) -> CiflowResult<RunReport> {
        let started = Instant::now();

        let (matched, skipped): (Vec<&PreparedPipeline>, Vec<&PreparedPipeline>) =
            pipelines.iter().partition(|p| p.matches(event));

        let matched_names: Vec<String> = matched.iter().map(|p| p.name().to_string()).collect();
        let skipped_names: Vec<String> = skipped.iter().map(|p| p.name().to_string()).collect();
        for name in &skipped_names {
            debug!("Workflow '{}' not triggered by {}", name, event);
        }

        let concurrency = self.concurrency(&matched);

        if matched.is_empty() {
            info!("No workflow triggered by {}", event);
            return Ok(RunReport {
                event: event.clone(),
                status: RunStatus::NotTriggered,
                matched: matched_names,
                skipped: skipped_names,
                concurrency,
                duration: started.elapsed(),
                verdict: None,
            });
        }

        // Expand everything up front so a bad workflow stops the run before
        // any job starts
        let mut instances = Vec::new();
        for pipeline in &matched {
            let next = instances.len();
            instances.extend(pipeline.instances(next)?);
        }
        if instances.is_empty() {
            return Err(CiflowError::EmptyRun);
        }

        info!(
            "Running {} job(s) from {} workflow(s) against {}, {} at a time",
            instances.len(),
            matched.len(),
            self.executor.source().display(),
            concurrency
        );

        let verdict = self.schedule(instances, concurrency, cancel).await?;
        let status = if verdict.is_success() {
            RunStatus::Success
        } else {
            RunStatus::Failure
        };

        Ok(RunReport {
            event: event.clone(),
            status,
            matched: matched_names,
            skipped: skipped_names,
            concurrency,
            duration: started.elapsed(),
            verdict: Some(verdict),
        })
    }

    async fn schedule(
        &self,
        instances: Vec<JobInstance>,
        concurrency: usize,
        cancel: &CancelToken,
    ) -> CiflowResult<PipelineVerdict> {
        let total = instances.len();
        self.notify(ProgressEvent::Planned { total, concurrency });

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel::<JobResult>(total);
        let mut tasks = JoinSet::new();

        for instance in instances {
            let semaphore = semaphore.clone();
            let executor = self.executor.clone();
            let cancel = cancel.clone();
            let tx = tx.clone();
            let progress = self.options.progress.clone();

            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| CiflowError::Worker {
                        message: e.to_string(),
                    })?;

                if let Some(progress) = &progress {
                    let _ = progress.send(ProgressEvent::JobStarted {
                        ordinal: instance.ordinal,
                        name: instance.display_name(),
                    });
                }

                let result = executor.execute(&instance, &cancel).await;
                tx.send(result).await.map_err(|e| CiflowError::Worker {
                    message: e.to_string(),
                })
            });
        }
        drop(tx);

        let mut aggregator = ResultAggregator::new();
        while let Some(result) = rx.recv().await {
            self.notify(ProgressEvent::JobFinished {
                ordinal: result.ordinal,
                name: result.display_name.clone(),
                success: result.is_success(),
                label: result.outcome.label(),
            });
            aggregator.record(result);
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| CiflowError::Worker {
                message: e.to_string(),
            })??;
        }

        if aggregator.len() != total {
            return Err(CiflowError::Worker {
                message: format!("{} of {} job results were lost", total - aggregator.len(), total),
            });
        }

        aggregator.finish()
    }
}
