// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Watch command - re-run on source changes
//!
//! Every debounced change starts a new run for the branch and supersedes
//! the run still in flight.

use colored::Colorize;
use miette::Result;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{job_executor, load_workflows, EventArgs, ExecutionArgs};
use crate::cache::CacheManager;
use crate::pipeline::{PipelineRunner, RunOptions, RunStatus, SupersessionRegistry};

/// Everything a run started by the watcher needs
struct WatchContext {
    event_args: EventArgs,
    jobs: Option<usize>,
    source: PathBuf,
    cache: CacheManager,
    cache_root: Option<PathBuf>,
    registry: SupersessionRegistry,
}

/// Run the watch command
pub async fn run(
    event_args: EventArgs,
    execution: ExecutionArgs,
    debounce_ms: u64,
    verbose: bool,
) -> Result<()> {
    // Fail early on a broken workflow set; later runs reload it
    load_workflows(&event_args.workflows)?;

    let source = execution.source_dir()?;
    let (cache, cache_root) = execution.open_cache()?;

    println!("{}", "Starting watch mode...".bold());
    println!(
        "Watching {} for changes (debounce: {}ms)",
        source.display(),
        debounce_ms
    );
    println!("Press {} to exit.", "Ctrl+C".cyan());
    println!();

    let (tx, mut rx) = mpsc::unbounded_channel::<DebounceEventResult>();
    let handler = move |res: DebounceEventResult| {
        let _ = tx.send(res);
    };
    let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms), handler)
        .map_err(|e| miette::miette!("Failed to create file watcher: {}", e))?;

    debouncer
        .watcher()
        .watch(&source, RecursiveMode::Recursive)
        .map_err(|e| miette::miette!("Failed to start watching: {}", e))?;

    let context = Arc::new(WatchContext {
        event_args,
        jobs: execution.jobs,
        source,
        cache,
        cache_root,
        registry: SupersessionRegistry::new(),
    });

    spawn_run(context.clone());

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(Ok(events)) => {
                    let relevant: Vec<_> = events
                        .iter()
                        .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                        .filter(|e| is_relevant(&e.path, &context))
                        .collect();

                    if relevant.is_empty() {
                        continue;
                    }

                    println!();
                    println!("{}", "─".repeat(50).dimmed());
                    println!(
                        "{}: {} file(s) changed",
                        "Change detected".yellow(),
                        relevant.len()
                    );
                    if verbose {
                        for event in &relevant {
                            println!("  {}", event.path.display());
                        }
                    }
                    println!();

                    spawn_run(context.clone());
                }
                Some(Err(e)) => {
                    eprintln!("{}: {}", "Watch error".red(), e);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                // Supersede whatever is running so its processes are stopped
                context.registry.begin(&context.event_args.branch).cancel();
                break;
            }
        }
    }

    Ok(())
}

fn is_relevant(path: &Path, context: &WatchContext) -> bool {
    let relative = path.strip_prefix(&context.source).unwrap_or(path);
    if relative.components().any(|c| c.as_os_str() == ".git") {
        return false;
    }
    match &context.cache_root {
        Some(root) => !path.starts_with(root),
        None => true,
    }
}

fn spawn_run(context: Arc<WatchContext>) {
    tokio::spawn(async move {
        let branch = context.event_args.branch.clone();
        let token = context.registry.begin(&branch);
        let started = std::time::Instant::now();

        let pipelines = match load_workflows(&context.event_args.workflows) {
            Ok(p) => p,
            Err(e) => {
                eprintln!("{}: {}", "Failed to load workflows".red(), e);
                context.registry.finish(&branch, &token);
                return;
            }
        };

        let executor = job_executor(
            context.source.clone(),
            context.cache.clone(),
            context.cache_root.as_deref(),
        );
        let runner = PipelineRunner::new(
            executor,
            RunOptions {
                concurrency: context.jobs,
                progress: None,
            },
        );

        let event = context.event_args.to_event();
        let outcome = runner.run(&pipelines, &event, &token).await;
        context.registry.finish(&branch, &token);

        let elapsed = started.elapsed().as_secs_f64();
        match outcome {
            Ok(_) if token.is_cancelled() => {
                println!("{} ({:.2}s)", "Run superseded".dimmed(), elapsed);
            }
            Ok(report) => match report.status {
                RunStatus::NotTriggered => {
                    println!("{}", format!("Nothing triggered by {}", event).dimmed());
                }
                RunStatus::Success => {
                    println!("{} ({:.2}s)", "Pipeline passed".green(), elapsed);
                }
                RunStatus::Failure => {
                    print!("{}", super::run::render_summary(&report));
                }
            },
            Err(e) => {
                eprintln!("{}: {}", "Run aborted".red(), e);
            }
        }
    });
}
