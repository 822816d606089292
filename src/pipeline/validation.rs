// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Workflow validation
//!
//! Everything that can make a run a ConfigurationError is checked here,
//! before any job starts.

use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path};

use super::trigger::TriggerEvaluator;
use super::vars::{references, Scope};
use crate::errors::{CiflowError, CiflowResult};
use crate::pipeline::{JobTemplate, PipelineDefinition, Step, StepAction};

/// Workflow validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a workflow definition
    pub fn validate(definition: &PipelineDefinition) -> ValidationResult {
        let mut result = ValidationResult::new();

        if definition.triggers.is_empty() {
            result.add_error("Workflow declares no triggers");
        }

        if let Err(e) = TriggerEvaluator::new(&definition.triggers) {
            result.add_error(&e.to_string());
        }

        if definition.jobs.is_empty() {
            result.add_error("Workflow has no jobs defined");
        }

        if definition.concurrency == Some(0) {
            result.add_error("concurrency must be at least 1");
        }

        let mut seen_jobs = HashSet::new();
        for name in definition.jobs.keys() {
            if !seen_jobs.insert(name) {
                result.add_error(&format!("Duplicate job name: '{}'", name));
            }
        }

        for (name, job) in definition.jobs.iter() {
            Self::validate_job(name, job, &definition.env, &mut result);
        }

        result
    }

    /// Validate and turn the first failure into a ConfigurationError
    pub fn ensure_valid(definition: &PipelineDefinition) -> CiflowResult<ValidationResult> {
        let result = Self::validate(definition);
        if result.is_valid() {
            Ok(result)
        } else {
            Err(CiflowError::config_with_help(
                &definition.name,
                result.errors.join("; "),
                "Run 'ciflow validate' for the full list of problems",
            ))
        }
    }

    fn validate_job(
        name: &str,
        job: &JobTemplate,
        global_env: &BTreeMap<String, String>,
        result: &mut ValidationResult,
    ) {
        let mut axes = HashSet::new();
        if let Some(matrix) = &job.matrix {
            if matrix.is_empty() {
                result.add_warning(&format!("Job '{}': matrix declares no axes", name));
            }
            for (axis, values) in matrix.iter() {
                if !axes.insert(axis) {
                    result.add_error(&format!("Job '{}': duplicate matrix axis '{}'", name, axis));
                }
                if values.is_empty() {
                    result.add_error(&format!(
                        "Job '{}': matrix axis '{}' has no values, so the job expands to no instances",
                        name, axis
                    ));
                }
                for value in values.iter().filter(|v| v.is_float()) {
                    result.add_warning(&format!(
                        "Job '{}': matrix axis '{}' value {} was read as a number and may have lost trailing zeros; quote it to keep it exact",
                        name, axis, value
                    ));
                }
            }
        }

        if job.steps.is_empty() {
            result.add_warning(&format!("Job '{}' has no steps", name));
        }

        let mut declared_env: HashSet<&str> = global_env.keys().map(String::as_str).collect();
        declared_env.extend(job.env.keys().map(String::as_str));

        if let Some(runs_on) = &job.runs_on {
            Self::check_references(name, "runs_on", runs_on, &axes, &declared_env, result);
        }
        for value in job.env.values() {
            Self::check_references(name, "env", value, &axes, &declared_env, result);
        }

        let mut seen_steps = HashSet::new();
        let mut after_drift_check = false;

        for step in &job.steps {
            let id = step.id();
            if !seen_steps.insert(id.clone()) {
                result.add_error(&format!("Job '{}': duplicate step id '{}'", name, id));
            }

            match &step.action {
                StepAction::DriftCheck(_) => after_drift_check = true,
                _ if after_drift_check => {
                    result.add_error(&format!(
                        "Job '{}': step '{}' runs after a drift check; drift checks must be the last steps of a job",
                        name, step.name
                    ));
                }
                _ => {}
            }

            Self::validate_step(name, step, &axes, &declared_env, result);
        }
    }

    fn validate_step(
        job: &str,
        step: &Step,
        axes: &HashSet<&str>,
        job_env: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        let mut declared_env = job_env.clone();
        declared_env.extend(step.env.keys().map(String::as_str));
        let context = format!("step '{}'", step.name);

        Self::check_references(job, &context, &step.name, axes, &declared_env, result);
        for value in step.env.values() {
            Self::check_references(job, &context, value, axes, &declared_env, result);
        }

        match &step.action {
            StepAction::Run(command) => {
                if command.trim().is_empty() {
                    result.add_error(&format!("Job '{}': {} has an empty command", job, context));
                }
                Self::check_references(job, &context, command, axes, &declared_env, result);
            }
            StepAction::SaveCache(spec) => {
                if spec.files.is_empty() {
                    result.add_warning(&format!(
                        "Job '{}': {} saves a cache keyed only by its namespace",
                        job, context
                    ));
                }
            }
            StepAction::DriftCheck(check) => {
                if check.regenerate.trim().is_empty() {
                    result.add_error(&format!(
                        "Job '{}': {} has an empty regenerate command",
                        job, context
                    ));
                }
                if !is_workspace_relative(&check.artifact) {
                    result.add_error(&format!(
                        "Job '{}': {} artifact '{}' must be a relative path inside the source tree",
                        job,
                        context,
                        check.artifact.display()
                    ));
                }
                Self::check_references(
                    job,
                    &context,
                    &check.regenerate,
                    axes,
                    &declared_env,
                    result,
                );
            }
        }

        let caches = step
            .inputs
            .iter()
            .map(|(_, spec)| spec)
            .chain(match &step.action {
                StepAction::SaveCache(spec) => Some(spec),
                _ => None,
            });

        for spec in caches {
            if spec.namespace.trim().is_empty() {
                result.add_error(&format!("Job '{}': {} has an empty cache namespace", job, context));
            }
            if !is_workspace_relative(&spec.path) {
                result.add_error(&format!(
                    "Job '{}': {} cache path '{}' must be a relative path inside the workspace",
                    job,
                    context,
                    spec.path.display()
                ));
            }
            for file in &spec.files {
                if !is_workspace_relative(file) {
                    result.add_error(&format!(
                        "Job '{}': {} cache key file '{}' must be a relative path",
                        job,
                        context,
                        file.display()
                    ));
                }
            }
            Self::check_references(job, &context, &spec.namespace, axes, &declared_env, result);
        }
    }

    fn check_references(
        job: &str,
        context: &str,
        text: &str,
        axes: &HashSet<&str>,
        env: &HashSet<&str>,
        result: &mut ValidationResult,
    ) {
        for reference in references(text) {
            match reference.scope {
                Scope::Matrix if !axes.contains(reference.name.as_str()) => {
                    result.add_error(&format!(
                        "Job '{}': {} references unknown matrix axis '{}'",
                        job, context, reference.name
                    ));
                }
                Scope::Env if !env.contains(reference.name.as_str()) => {
                    result.add_error(&format!(
                        "Job '{}': {} references undeclared variable '{}'",
                        job, context, reference.name
                    ));
                }
                _ => {}
            }
        }
    }
}

fn is_workspace_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Result of workflow validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(yaml: &str) -> ValidationResult {
        let definition = PipelineDefinition::from_yaml(yaml).unwrap();
        PipelineValidator::validate(&definition)
    }

    #[test]
    fn test_valid_workflow() {
        let result = validate(
            r#"
on:
  push:
    branches: [main]
env:
  FLAGS: -D warnings
jobs:
  check:
    matrix:
      target: [wasm32-unknown-unknown]
    steps:
      - name: Check
        run: cargo check --target ${{ matrix.target }}
        env:
          RUSTFLAGS: ${{ env.FLAGS }}
      - name: Lockfile
        drift_check:
          artifact: Cargo.lock
          regenerate: cargo update --workspace
"#,
        );
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(!result.has_warnings());
    }

    #[test]
    fn test_unquoted_float_axis_value_warns() {
        let result = validate(
            "on: push\njobs:\n  t:\n    matrix:\n      toolchain: [stable, 1.70, \"1.80\"]\n    steps:\n      - name: a\n        run: cargo +${{ matrix.toolchain }} test\n",
        );
        assert!(result.is_valid(), "{:?}", result.errors);
        assert_eq!(result.warnings.len(), 1, "{:?}", result.warnings);
        assert!(result.warnings[0].contains("axis 'toolchain' value 1.7 was read as a number"));
    }

    #[test]
    fn test_empty_workflow() {
        let result = validate("on: push\njobs: {}\n");
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no jobs"));
    }

    #[test]
    fn test_empty_axis_is_error() {
        let result = validate(
            "on: push\njobs:\n  t:\n    matrix:\n      os: []\n    steps:\n      - name: a\n        run: 'true'\n",
        );
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("no values")));
    }

    #[test]
    fn test_malformed_branch_pattern() {
        let result = validate(
            "on:\n  push:\n    branches: ['release/[']\njobs:\n  t:\n    steps:\n      - name: a\n        run: 'true'\n",
        );
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("release/[")));
    }

    #[test]
    fn test_drift_check_must_be_last() {
        let result = validate(
            r#"
on: push
jobs:
  lock:
    steps:
      - name: Lockfile
        drift_check:
          artifact: Cargo.lock
          regenerate: cargo update
      - name: Build
        run: cargo build
"#,
        );
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("after a drift check")));
    }

    #[test]
    fn test_unknown_references() {
        let result = validate(
            r#"
on: push
jobs:
  t:
    steps:
      - name: Build
        run: cargo build --target ${{ matrix.target }} ${{ env.MISSING }}
"#,
        );
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("unknown matrix axis 'target'"));
        assert!(result.errors[1].contains("undeclared variable 'MISSING'"));
    }

    #[test]
    fn test_cache_paths_must_stay_in_workspace() {
        let result = validate(
            r#"
on: push
jobs:
  t:
    steps:
      - name: Save
        save_cache:
          namespace: cargo
          files: [Cargo.lock]
          path: ../outside
"#,
        );
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("inside the workspace"));
    }

    #[test]
    fn test_duplicate_step_ids() {
        let result = validate(
            r#"
on: push
jobs:
  t:
    steps:
      - name: Build
        run: cargo build
      - name: build
        run: cargo build --release
"#,
        );
        assert!(result.errors.iter().any(|e| e.contains("duplicate step id 'build'")));
    }

    #[test]
    fn test_duplicate_job_names() {
        let mut definition = PipelineDefinition::from_yaml(
            "on: push\njobs:\n  build:\n    steps:\n      - name: a\n        run: 'true'\n",
        )
        .unwrap();
        let job = definition.get_job("build").unwrap().clone();
        definition.jobs.insert("build", job);

        let result = PipelineValidator::validate(&definition);
        assert!(result.errors.iter().any(|e| e.contains("Duplicate job name")));

        let err = PipelineValidator::ensure_valid(&definition).unwrap_err();
        assert!(err.is_configuration());
    }
}
