// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Validate command - check workflow files

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::resolve_workflows;
use crate::pipeline::{MatrixExpander, PipelineDefinition, PipelineValidator};

/// Run the validate command
pub async fn run(workflows: Vec<PathBuf>, verbose: bool) -> Result<()> {
    let paths = resolve_workflows(&workflows)?;
    let mut invalid = 0;

    println!("{}", "Validating workflows...".bold());

    for path in &paths {
        println!();
        println!("{}", path.display().to_string().bold());

        let definition = match PipelineDefinition::from_file(path) {
            Ok(d) => d,
            Err(e) => {
                println!("  {} Failed to parse: {}", "✗".red(), e);
                invalid += 1;
                continue;
            }
        };

        let validation = PipelineValidator::validate(&definition);

        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }

        if !validation.is_valid() {
            invalid += 1;
            continue;
        }

        let instances: usize = definition
            .jobs
            .iter()
            .map(|(_, job)| MatrixExpander::count(job))
            .sum();
        println!(
            "  {} '{}': {} job(s), {} instance(s)",
            "✓".green(),
            definition.name,
            definition.jobs.len(),
            instances
        );

        if verbose {
            for (name, job) in definition.jobs.iter() {
                println!(
                    "    - {} {}",
                    name,
                    format!(
                        "[{} step(s), x{}, timeout {}]",
                        job.steps.len(),
                        MatrixExpander::count(job),
                        crate::pipeline::format_duration(job.timeout())
                    )
                    .dimmed()
                );
            }
        }
    }

    println!();

    if invalid > 0 {
        Err(miette::miette!(
            "{} of {} workflow(s) are invalid",
            invalid,
            paths.len()
        ))
    } else {
        println!("{}", "All workflows are valid!".green().bold());
        Ok(())
    }
}
