// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Matrix expansion
//!
//! Expands a job template into concrete job instances. The cross product is
//! produced lazily by an odometer over the axis value table: the first
//! declared axis varies slowest, the last fastest. Order depends only on the
//! definition, so re-expanding a template always yields the same sequence.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::definition::{
    AxisValue, CacheSpec, DriftCheck, JobTemplate, OrderedMap, PipelineDefinition, Step,
    StepAction, StepKind,
};
use super::vars::{merge_env, substitute};

/// Runtime descriptor used when a job declares no `runs_on`
pub const DEFAULT_RUNS_ON: &str = "local";

/// One concrete value per axis, in axis declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatrixAssignment(Vec<(String, String)>);

impl MatrixAssignment {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    pub fn get(&self, axis: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Values joined for display, e.g. `ubuntu-latest, stable`
    pub fn label(&self) -> String {
        self.0
            .iter()
            .map(|(_, v)| v.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Assignment exported as `MATRIX_<AXIS>` variables
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        self.0
            .iter()
            .map(|(axis, value)| (matrix_var_name(axis), value.clone()))
            .collect()
    }
}

fn matrix_var_name(axis: &str) -> String {
    let mut name = String::from("MATRIX_");
    for c in axis.chars() {
        if c.is_ascii_alphanumeric() {
            name.push(c.to_ascii_uppercase());
        } else {
            name.push('_');
        }
    }
    name
}

impl Serialize for MatrixAssignment {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Lazy cross product of a template's matrix axes
#[derive(Debug, Clone)]
pub struct Expansion<'a> {
    axes: Vec<(&'a str, &'a [AxisValue])>,
    cursor: Vec<usize>,
    remaining: usize,
}

impl<'a> Expansion<'a> {
    fn new(template: &'a JobTemplate) -> Self {
        let axes: Vec<(&str, &[AxisValue])> = match &template.matrix {
            Some(matrix) => matrix
                .iter()
                .map(|(name, values)| (name, values.as_slice()))
                .collect(),
            None => Vec::new(),
        };

        // An empty product (no axes) is a single empty assignment
        let remaining = axes.iter().map(|(_, values)| values.len()).product();

        Self {
            cursor: vec![0; axes.len()],
            axes,
            remaining,
        }
    }

    fn advance(&mut self) {
        for position in (0..self.axes.len()).rev() {
            self.cursor[position] += 1;
            if self.cursor[position] < self.axes[position].1.len() {
                return;
            }
            self.cursor[position] = 0;
        }
    }
}

impl Iterator for Expansion<'_> {
    type Item = MatrixAssignment;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let assignment = MatrixAssignment(
            self.axes
                .iter()
                .zip(&self.cursor)
                .map(|((name, values), &index)| (name.to_string(), values[index].as_str().to_string()))
                .collect(),
        );

        self.remaining -= 1;
        if self.remaining > 0 {
            self.advance();
        }

        Some(assignment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Expansion<'_> {}

/// A job template bound to one matrix assignment, with every reference
/// resolved
#[derive(Debug, Clone, Serialize)]
pub struct JobInstance {
    /// Workflow the job belongs to
    pub workflow: String,
    /// Job name within the workflow
    pub job: String,
    /// Position in the run's expansion order
    pub ordinal: usize,
    pub assignment: MatrixAssignment,
    pub runs_on: String,
    #[serde(serialize_with = "crate::pipeline::aggregate::serialize_millis")]
    pub timeout: Duration,
    /// Global, job and matrix variables merged
    pub env: BTreeMap<String, String>,
    pub cache_enabled: bool,
    pub steps: Vec<ResolvedStep>,
}

impl JobInstance {
    /// `job` or `job (v1, v2)`
    pub fn display_name(&self) -> String {
        if self.assignment.is_empty() {
            self.job.clone()
        } else {
            format!("{} ({})", self.job, self.assignment.label())
        }
    }
}

/// A step with its commands, cache namespaces and environment resolved
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedStep {
    pub id: String,
    pub name: String,
    pub kind: StepKind,
    pub action: StepAction,
    pub inputs: OrderedMap<CacheSpec>,
    /// Job environment plus step overrides
    pub env: BTreeMap<String, String>,
    pub shell: Option<String>,
}

/// Matrix expander for job templates
pub struct MatrixExpander;

impl MatrixExpander {
    /// Lazily expand a template's matrix into assignments
    pub fn expand(template: &JobTemplate) -> Expansion<'_> {
        Expansion::new(template)
    }

    /// Number of instances a template expands to
    pub fn count(template: &JobTemplate) -> usize {
        Self::expand(template).len()
    }

    /// Lazily produce the instances of one job, numbering them from `first_ordinal`
    pub fn instances<'a>(
        definition: &'a PipelineDefinition,
        job: &'a str,
        template: &'a JobTemplate,
        first_ordinal: usize,
    ) -> impl Iterator<Item = JobInstance> + 'a {
        Self::expand(template)
            .enumerate()
            .map(move |(i, assignment)| {
                Self::resolve(definition, job, template, assignment, first_ordinal + i)
            })
    }

    /// Expand every job of a definition, in declaration order
    pub fn expand_definition(definition: &PipelineDefinition) -> Vec<JobInstance> {
        let mut instances = Vec::new();
        for (name, template) in definition.jobs.iter() {
            let first = instances.len();
            instances.extend(Self::instances(definition, name, template, first));
        }
        instances
    }

    /// Bind a template to one assignment
    pub fn resolve(
        definition: &PipelineDefinition,
        job: &str,
        template: &JobTemplate,
        assignment: MatrixAssignment,
        ordinal: usize,
    ) -> JobInstance {
        let mut env = merge_env(&definition.env, &template.env, &assignment);
        env.extend(assignment.env_vars());

        let runs_on = template
            .runs_on
            .as_deref()
            .map(|r| substitute(r, &assignment, &env))
            .unwrap_or_else(|| DEFAULT_RUNS_ON.to_string());

        let steps = template
            .steps
            .iter()
            .map(|step| Self::resolve_step(step, &assignment, &env))
            .collect();

        JobInstance {
            workflow: definition.name.clone(),
            job: job.to_string(),
            ordinal,
            assignment,
            runs_on,
            timeout: template.timeout(),
            env,
            cache_enabled: definition.cache.enabled,
            steps,
        }
    }

    fn resolve_step(
        step: &Step,
        assignment: &MatrixAssignment,
        job_env: &BTreeMap<String, String>,
    ) -> ResolvedStep {
        let env = merge_env(job_env, &step.env, assignment);
        let sub = |text: &str| substitute(text, assignment, &env);
        let sub_cache = |spec: &CacheSpec| CacheSpec {
            namespace: sub(&spec.namespace),
            files: spec.files.clone(),
            path: spec.path.clone(),
        };

        let action = match &step.action {
            StepAction::Run(command) => StepAction::Run(sub(command)),
            StepAction::SaveCache(spec) => StepAction::SaveCache(sub_cache(spec)),
            StepAction::DriftCheck(check) => StepAction::DriftCheck(DriftCheck {
                artifact: check.artifact.clone(),
                regenerate: sub(&check.regenerate),
            }),
        };

        let inputs = step
            .inputs
            .iter()
            .map(|(name, spec)| (name, sub_cache(spec)))
            .collect();
        let name = sub(&step.name);

        ResolvedStep {
            id: step.id(),
            name,
            kind: step.kind(),
            action,
            inputs,
            env,
            shell: step.shell.clone(),
        }
    }
}
