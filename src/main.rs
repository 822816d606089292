// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! ciflow - declarative build-verification pipelines

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ciflow::cli::{exit_code_for, Cli, Commands};
use ciflow::pipeline::EXIT_SUCCESS;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if !ciflow::utils::should_use_colors() {
        colored::control::set_override(false);
    }

    // Initialize tracing
    let default_filter = if cli.verbose { "ciflow=debug" } else { "ciflow=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{:?}", report);
            exit_code_for(&report)
        }
    };

    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Init { force } => ciflow::cli::init::run(force, cli.verbose).await?,
        Commands::Run {
            event,
            execution,
            format,
        } => return ciflow::cli::run::run(event, execution, format, cli.verbose).await,
        Commands::Validate { workflows } => {
            ciflow::cli::validate::run(workflows, cli.verbose).await?
        }
        Commands::Plan { workflows, format } => {
            ciflow::cli::plan::run(workflows, format, cli.verbose).await?
        }
        Commands::Cache { action, cache_dir } => {
            ciflow::cli::cache::run(action, cache_dir, cli.verbose).await?
        }
        Commands::Watch {
            event,
            execution,
            debounce,
        } => ciflow::cli::watch::run(event, execution, debounce, cli.verbose).await?,
    }

    Ok(EXIT_SUCCESS)
}
