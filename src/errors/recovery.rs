// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Recovery suggestions
//!
//! Actionable next steps printed under a failed job or a configuration
//! error.

use crate::pipeline::{format_duration, JobOutcome, JobResult, StepKind};

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
    /// Whether ciflow can apply the fix itself
    pub auto_fixable: bool,
}

impl RecoverySuggestion {
    /// Suggestion for a job that did not succeed; `None` for a passed job
    pub fn for_outcome(result: &JobResult) -> Option<Self> {
        match &result.outcome {
            JobOutcome::Success => None,
            JobOutcome::Failure { step, exit_code, .. } => match step.kind {
                Some(StepKind::DriftCheck) => Some(Self::regenerate_artifact(&step.detail)),
                Some(StepKind::SaveCache) => Some(Self {
                    action: format!("Check the cache step '{}'", step.name),
                    steps: vec![
                        "The directory to cache was not produced by the earlier steps".into(),
                        "Make sure a previous step creates it inside the workspace".into(),
                    ],
                    commands: vec![],
                    auto_fixable: false,
                }),
                Some(StepKind::Run) => Some(Self::reproduce_locally(
                    &step.name,
                    &step.detail,
                    *exit_code,
                    &result.display_name,
                )),
                None => Some(Self {
                    action: "Check the source tree".into(),
                    steps: vec![
                        format!("Job '{}' could not prepare its workspace", result.display_name),
                        "Make sure every file in the source tree is readable".into(),
                    ],
                    commands: vec![],
                    auto_fixable: false,
                }),
            },
            JobOutcome::TimedOut { step, after } => Some(Self {
                action: format!("Speed up or extend job '{}'", result.job),
                steps: vec![
                    format!(
                        "The job ran out of time after {}{}",
                        format_duration(*after),
                        step.as_deref()
                            .map(|s| format!(" during '{}'", s))
                            .unwrap_or_default()
                    ),
                    "Raise the job's timeout if the work legitimately takes longer".into(),
                ],
                commands: vec![
                    "# In the workflow file:".into(),
                    format!(
                        "jobs.{}.timeout: {}",
                        result.job,
                        format_duration(after.saturating_mul(2))
                    ),
                ],
                auto_fixable: false,
            }),
            JobOutcome::Cancelled { .. } => Some(Self {
                action: "Run again".into(),
                steps: vec![
                    "The run was cancelled or superseded by a newer change".into(),
                    "No verdict was reached for this job".into(),
                ],
                commands: vec!["ciflow run".into()],
                auto_fixable: false,
            }),
        }
    }

    /// Suggest regenerating a drifted artifact
    pub fn regenerate_artifact(artifact: &str) -> Self {
        Self {
            action: format!("Regenerate and commit '{}'", artifact),
            steps: vec![
                format!("The committed '{}' no longer matches what the build produces", artifact),
                "Run the regeneration command locally, review the change and commit it".into(),
            ],
            commands: vec![
                "# After regenerating:".into(),
                format!("git diff -- {}", artifact),
                format!("git add {}", artifact),
            ],
            auto_fixable: false,
        }
    }

    /// Suggest reproducing a failed command
    pub fn reproduce_locally(step: &str, command: &str, exit_code: i32, job: &str) -> Self {
        let mut steps = vec![format!(
            "Step '{}' of job '{}' exited with code {}",
            step, job, exit_code
        )];
        if exit_code == 127 {
            steps.push("Exit code 127 usually means the command was not found".into());
        }
        steps.push("Reproduce it locally to see the full output".into());

        Self {
            action: format!("Fix step '{}'", step),
            steps,
            commands: vec!["# Reproduce:".into(), command.to_string()],
            auto_fixable: false,
        }
    }

    /// Suggest creating a workflow file
    pub fn create_workflow() -> Self {
        Self {
            action: "Create a workflow".into(),
            steps: vec![
                "No workflow found under .ciflow/".into(),
                "Initialize one or pass a file with --workflow".into(),
            ],
            commands: vec!["# Write a starter workflow:".into(), "ciflow init".into()],
            auto_fixable: true,
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FailedStep;
    use std::time::Duration;

    fn job(outcome: JobOutcome) -> JobResult {
        JobResult {
            workflow: "CI".into(),
            job: "test".into(),
            display_name: "test (B)".into(),
            ordinal: 0,
            assignment: Default::default(),
            runs_on: "local".into(),
            outcome,
            duration: Duration::from_secs(1),
            steps: vec![],
            log: String::new(),
        }
    }

    #[test]
    fn test_no_suggestion_for_success() {
        assert!(RecoverySuggestion::for_outcome(&job(JobOutcome::Success)).is_none());
    }

    #[test]
    fn test_drift_suggests_regeneration() {
        let outcome = JobOutcome::Failure {
            step: FailedStep {
                id: "lockfile".into(),
                name: "Lockfile".into(),
                kind: Some(StepKind::DriftCheck),
                detail: "Cargo.lock".into(),
            },
            exit_code: 1,
            log: String::new(),
        };

        let suggestion = RecoverySuggestion::for_outcome(&job(outcome)).unwrap();
        assert_eq!(suggestion.action, "Regenerate and commit 'Cargo.lock'");
        assert!(suggestion.commands.contains(&"git add Cargo.lock".to_string()));
    }

    #[test]
    fn test_command_failure_shows_command() {
        let outcome = JobOutcome::Failure {
            step: FailedStep {
                id: "test".into(),
                name: "Test".into(),
                kind: Some(StepKind::Run),
                detail: "cargo test".into(),
            },
            exit_code: 127,
            log: String::new(),
        };

        let text = RecoverySuggestion::for_outcome(&job(outcome)).unwrap().to_string();
        assert!(text.starts_with("→ Fix step 'Test'"));
        assert!(text.contains("exited with code 127"));
        assert!(text.contains("command was not found"));
        assert!(text.contains("  cargo test"));
    }

    #[test]
    fn test_timeout_suggests_longer_budget() {
        let outcome = JobOutcome::TimedOut {
            step: Some("Sleep".into()),
            after: Duration::from_secs(60),
        };

        let suggestion = RecoverySuggestion::for_outcome(&job(outcome)).unwrap();
        assert!(suggestion.steps[0].contains("during 'Sleep'"));
        assert_eq!(suggestion.commands[1], format!("jobs.test.timeout: {}", format_duration(Duration::from_secs(120))));
    }
}
