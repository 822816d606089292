// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Run command - execute every triggered workflow

use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use tokio::sync::mpsc;
use tracing::warn;

use super::{job_executor, load_workflows, EventArgs, ExecutionArgs, OutputFormat};
use crate::errors::RecoverySuggestion;
use crate::pipeline::{
    format_duration, CancelToken, JobOutcome, JobResult, PipelineRunner, RunOptions, RunReport,
    RunStatus,
};
use crate::utils::{outcome_glyph, ProgressDisplay};

/// Run the pipeline; returns the process exit code
pub async fn run(
    event_args: EventArgs,
    execution: ExecutionArgs,
    format: OutputFormat,
    verbose: bool,
) -> Result<i32> {
    let pipelines = load_workflows(&event_args.workflows)?;

    if verbose {
        for pipeline in &pipelines {
            for warning in &pipeline.validation.warnings {
                eprintln!("  {} {}: {}", "⚠".yellow(), pipeline.name(), warning);
            }
        }
    }

    let source = execution.source_dir()?;
    let (cache, cache_root) = execution.open_cache()?;
    let executor = job_executor(source, cache, cache_root.as_deref());

    let interactive = format == OutputFormat::Text && console::Term::stdout().is_term();
    let (tx, rx) = mpsc::unbounded_channel();
    let display = ProgressDisplay::spawn(rx, interactive);

    let runner = PipelineRunner::new(
        executor,
        RunOptions {
            concurrency: execution.jobs,
            progress: Some(tx),
        },
    );

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling running jobs");
            on_interrupt.cancel();
        }
    });

    let event = event_args.to_event();
    let report = runner.run(&pipelines, &event, &cancel).await;
    drop(runner);
    display.finish().await;
    let report = report?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        OutputFormat::Text => print!("{}", render_summary(&report)),
    }

    Ok(report.exit_code())
}

/// Human-readable run summary: one line per job, then details and a
/// recovery hint for every job that did not pass
pub fn render_summary(report: &RunReport) -> String {
    let mut lines = Vec::new();

    if report.status == RunStatus::NotTriggered {
        lines.push(format!(
            "{} no workflow is triggered by {}",
            "Nothing to run:".bold(),
            report.event
        ));
        for name in &report.skipped {
            lines.push(format!("  {} {}", "○".dimmed(), name.dimmed()));
        }
        return lines.join("\n") + "\n";
    }

    lines.push(format!("{} {}", "Results for".bold(), report.event));
    for result in report.results() {
        lines.push(format!(
            "  {} {} {}",
            outcome_glyph(&result.outcome),
            result.display_name,
            format!("({:.2}s)", result.duration.as_secs_f64()).dimmed()
        ));
    }

    let failures: Vec<&JobResult> = report.results().iter().filter(|r| !r.is_success()).collect();
    for result in &failures {
        lines.push(String::new());
        lines.push(
            format!("{} {}", result.display_name, result.outcome.label())
                .red()
                .bold()
                .to_string(),
        );
        lines.extend(describe(&result.outcome));

        if let Some(suggestion) = RecoverySuggestion::for_outcome(result) {
            lines.push(String::new());
            lines.extend(suggestion.to_string().lines().map(|l| {
                if l.is_empty() {
                    String::new()
                } else {
                    format!("  {}", l)
                }
            }));
        }
    }

    let passed = report.results().len() - failures.len();
    lines.push(String::new());
    let tally = format!(
        "{} passed, {} failed ({:.2}s)",
        passed,
        failures.len(),
        report.duration.as_secs_f64()
    );
    lines.push(if failures.is_empty() {
        tally.green().bold().to_string()
    } else {
        tally.red().bold().to_string()
    });

    lines.join("\n") + "\n"
}

fn describe(outcome: &JobOutcome) -> Vec<String> {
    match outcome {
        JobOutcome::Success => vec![],
        JobOutcome::Failure {
            step,
            exit_code,
            log,
        } => {
            let mut lines = vec![format!(
                "  step '{}' exited with code {}",
                step.name, exit_code
            )];
            lines.extend(log.lines().map(|l| format!("    {} {}", "│".dimmed(), l)));
            lines
        }
        JobOutcome::TimedOut { step, after } => vec![match step {
            Some(step) => format!(
                "  timed out after {} during step '{}'",
                format_duration(*after),
                step
            ),
            None => format!("  timed out after {}", format_duration(*after)),
        }],
        JobOutcome::Cancelled { step } => vec![match step {
            Some(step) => format!("  cancelled during step '{}'", step),
            None => "  cancelled before it started".to_string(),
        }],
    }
}
