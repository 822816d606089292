// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Job results and the pipeline verdict

use serde::{Serialize, Serializer};
use std::time::Duration;

use super::definition::StepKind;
use super::matrix::MatrixAssignment;
use crate::errors::{CiflowError, CiflowResult};

/// Number of trailing log lines kept as a failure excerpt
pub const EXCERPT_LINES: usize = 40;

/// Serialize a duration as whole milliseconds
pub fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Last `lines` lines of a log
pub fn log_tail(log: &str, lines: usize) -> String {
    let all: Vec<&str> = log.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// The step a job failed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedStep {
    pub id: String,
    pub name: String,
    /// `None` when the job failed before its first step (workspace setup)
    pub kind: Option<StepKind>,
    /// Command that ran, or the drift-checked artifact
    pub detail: String,
}

/// How a job instance ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Success,
    Failure {
        step: FailedStep,
        exit_code: i32,
        /// Tail of the job log
        log: String,
    },
    TimedOut {
        /// Step that was running when the timeout fired
        step: Option<String>,
        #[serde(serialize_with = "serialize_millis")]
        after: Duration,
    },
    Cancelled {
        step: Option<String>,
    },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Short label for summaries
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "passed",
            Self::Failure { .. } => "failed",
            Self::TimedOut { .. } => "timed out",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Name of the step the job stopped on, if any
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Failure { step, .. } => Some(&step.name),
            Self::TimedOut { step, .. } | Self::Cancelled { step } => step.as_deref(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failure { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}

/// Record of one executed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub id: String,
    pub name: String,
    pub kind: StepKind,
    /// `None` when the step was interrupted
    pub exit_code: Option<i32>,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
}

/// Result of one job instance
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub workflow: String,
    pub job: String,
    pub display_name: String,
    pub ordinal: usize,
    pub assignment: MatrixAssignment,
    pub runs_on: String,
    pub outcome: JobOutcome,
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub steps: Vec<StepRecord>,
    /// Complete captured log
    pub log: String,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

/// Collects job results as they arrive.
///
/// Arrival order is irrelevant: results are ordered by expansion ordinal
/// when the verdict is produced.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    results: Vec<JobResult>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: JobResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Derive the verdict. An empty result set is a configuration error,
    /// never a vacuous success.
    pub fn finish(mut self) -> CiflowResult<PipelineVerdict> {
        if self.results.is_empty() {
            return Err(CiflowError::EmptyRun);
        }

        self.results.sort_by_key(|r| r.ordinal);
        let success = self.results.iter().all(JobResult::is_success);

        Ok(PipelineVerdict {
            success,
            results: self.results,
        })
    }
}

/// Aggregate outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineVerdict {
    success: bool,
    pub results: Vec<JobResult>,
}

impl PipelineVerdict {
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Every job that did not succeed, in expansion order
    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// 0 on success, 1 otherwise
    pub fn exit_code(&self) -> i32 {
        if self.success {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn result(job: &str, ordinal: usize, outcome: JobOutcome) -> JobResult {
        JobResult {
            workflow: "CI".to_string(),
            job: job.to_string(),
            display_name: job.to_string(),
            ordinal,
            assignment: MatrixAssignment::default(),
            runs_on: "local".to_string(),
            outcome,
            duration: Duration::from_millis(10),
            steps: vec![],
            log: String::new(),
        }
    }

    pub(crate) fn failure(step: &str, exit_code: i32) -> JobOutcome {
        JobOutcome::Failure {
            step: FailedStep {
                id: step.to_lowercase(),
                name: step.to_string(),
                kind: Some(StepKind::Run),
                detail: "false".to_string(),
            },
            exit_code,
            log: "==> Test\nerror".to_string(),
        }
    }

    #[test]
    fn test_all_success() {
        let mut agg = ResultAggregator::new();
        agg.record(result("fmt", 0, JobOutcome::Success));
        agg.record(result("test", 1, JobOutcome::Success));

        let verdict = agg.finish().unwrap();
        assert!(verdict.is_success());
        assert_eq!(verdict.exit_code(), 0);
        assert_eq!(verdict.passed(), 2);
    }

    #[test]
    fn test_empty_is_configuration_error() {
        let err = ResultAggregator::new().finish().unwrap_err();
        assert!(matches!(err, CiflowError::EmptyRun));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_single_timeout_fails_run() {
        let mut agg = ResultAggregator::new();
        for i in 0..9 {
            agg.record(result(&format!("job{}", i), i, JobOutcome::Success));
        }
        agg.record(result(
            "slow",
            9,
            JobOutcome::TimedOut {
                step: Some("Sleep".into()),
                after: Duration::from_secs(1),
            },
        ));

        let verdict = agg.finish().unwrap();
        assert!(!verdict.is_success());
        assert_eq!(verdict.exit_code(), 1);
        let failed: Vec<_> = verdict.failures().map(|r| r.job.as_str()).collect();
        assert_eq!(failed, vec!["slow"]);
    }

    #[test]
    fn test_arrival_order_does_not_matter() {
        let outcomes = vec![
            result("a", 0, JobOutcome::Success),
            result("b", 1, failure("Test", 101)),
            result("c", 2, JobOutcome::Cancelled { step: None }),
        ];

        let mut forward = ResultAggregator::new();
        let mut backward = ResultAggregator::new();
        for r in outcomes.iter().cloned() {
            forward.record(r);
        }
        for r in outcomes.iter().rev().cloned() {
            backward.record(r);
        }

        let forward = forward.finish().unwrap();
        let backward = backward.finish().unwrap();
        assert_eq!(forward.is_success(), backward.is_success());

        let order = |v: &PipelineVerdict| v.results.iter().map(|r| r.job.clone()).collect::<Vec<_>>();
        assert_eq!(order(&forward), order(&backward));
        assert_eq!(order(&forward), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_outcome_accessors() {
        let outcome = failure("Test", 3);
        assert_eq!(outcome.label(), "failed");
        assert_eq!(outcome.step_name(), Some("Test"));
        assert_eq!(outcome.exit_code(), Some(3));
        assert_eq!(JobOutcome::Success.step_name(), None);
    }

    #[test]
    fn test_outcome_json() {
        let json = serde_json::to_value(JobOutcome::TimedOut {
            step: Some("Sleep".into()),
            after: Duration::from_millis(1500),
        })
        .unwrap();
        assert_eq!(json["status"], "timed_out");
        assert_eq!(json["after"], 1500);
    }

    #[test]
    fn test_log_tail() {
        let log = (1..=50).map(|i| i.to_string()).collect::<Vec<_>>().join("\n");
        let tail = log_tail(&log, EXCERPT_LINES);
        assert_eq!(tail.lines().count(), 40);
        assert!(tail.starts_with("11\n"));
        assert_eq!(log_tail("one", 40), "one");
    }
}
