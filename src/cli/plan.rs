// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Plan command - show the job instances a run would execute

use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;

use super::{load_workflows, OutputFormat};
use crate::pipeline::{format_duration, JobInstance, StepAction, Trigger};

#[derive(Serialize)]
struct WorkflowPlan<'a> {
    workflow: &'a str,
    triggers: &'a [Trigger],
    jobs: Vec<JobInstance>,
}

/// Run the plan command
pub async fn run(workflows: Vec<PathBuf>, format: OutputFormat, verbose: bool) -> Result<()> {
    let pipelines = load_workflows(&workflows)?;

    let mut plans = Vec::new();
    let mut next = 0;
    for pipeline in &pipelines {
        let jobs = pipeline.instances(next)?;
        next += jobs.len();
        plans.push(WorkflowPlan {
            workflow: pipeline.name(),
            triggers: &pipeline.definition.triggers,
            jobs,
        });
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&plans).into_diagnostic()?);
        return Ok(());
    }

    for plan in &plans {
        println!("{}", plan.workflow.bold());
        for trigger in plan.triggers {
            let branches = if trigger.branches.is_empty() {
                "all branches".to_string()
            } else {
                trigger.branches.join(", ")
            };
            println!("  on {} {}", trigger.kind, format!("({})", branches).dimmed());
        }

        for instance in &plan.jobs {
            println!(
                "  {} {} {}",
                format!("#{}", instance.ordinal).dimmed(),
                instance.display_name(),
                format!(
                    "[{}, timeout {}]",
                    instance.runs_on,
                    format_duration(instance.timeout)
                )
                .dimmed()
            );

            if verbose {
                for step in &instance.steps {
                    let what = match &step.action {
                        StepAction::Run(command) => command.clone(),
                        StepAction::SaveCache(spec) => {
                            format!("save {} as {}", spec.path.display(), spec.namespace)
                        }
                        StepAction::DriftCheck(check) => {
                            format!(
                                "{} is regenerated by '{}'",
                                check.artifact.display(),
                                check.regenerate
                            )
                        }
                    };
                    println!("      {} {}", step.name, what.cyan());
                }
            }
        }
        println!();
    }

    println!("{} job instance(s) in {} workflow(s)", next, plans.len());
    Ok(())
}
