// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for ciflow.

pub mod cache;
pub mod init;
pub mod plan;
pub mod run;
pub mod validate;
pub mod watch;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{default_cache_dir, CacheManager, FilesystemCache, MemoryCache};
use crate::errors::{CiflowError, CiflowResult};
use crate::executors::{JobExecutor, ShellRunner};
use crate::pipeline::{EventKind, PreparedPipeline, EXIT_CONFIGURATION, EXIT_INTERNAL};

/// Directory holding the default workflow set
pub const WORKFLOW_DIR: &str = ".ciflow";

/// Declarative build-verification pipelines
///
/// Run matrix-expanded jobs against a source tree and get one verdict.
#[derive(Parser, Debug)]
#[clap(
    name = "ciflow",
    version,
    about = "Declarative build-verification pipelines with matrix expansion and content-keyed caches",
    long_about = None,
    after_help = "Examples:\n\
        ciflow init                          Write a starter workflow\n\
        ciflow validate                      Check every workflow under .ciflow/\n\
        ciflow plan                          Show the expanded job instances\n\
        ciflow run --branch main             Run as if main was pushed to\n\
        ciflow watch --branch dev            Re-run on every change\n\n\
        See 'ciflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter workflow to .ciflow/ci.yml
    Init {
        /// Overwrite an existing workflow
        #[clap(long)]
        force: bool,
    },

    /// Run every workflow the event triggers
    Run {
        #[clap(flatten)]
        event: EventArgs,

        #[clap(flatten)]
        execution: ExecutionArgs,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Validate workflow files
    Validate {
        /// Workflow files (default: every workflow under .ciflow/)
        workflows: Vec<PathBuf>,
    },

    /// Print the job instances each workflow expands to
    Plan {
        /// Workflow files (default: every workflow under .ciflow/)
        #[clap(short, long = "workflow", value_name = "FILE")]
        workflows: Vec<PathBuf>,

        /// Output format
        #[clap(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Cache management
    Cache {
        #[clap(subcommand)]
        action: CacheAction,

        /// Cache store root
        #[clap(long, global = true, env = "CIFLOW_CACHE_DIR", value_name = "DIR")]
        cache_dir: Option<PathBuf>,
    },

    /// Watch mode - re-run on source changes, superseding the run in flight
    Watch {
        #[clap(flatten)]
        event: EventArgs,

        #[clap(flatten)]
        execution: ExecutionArgs,

        /// Debounce delay in milliseconds
        #[clap(long, default_value = "500")]
        debounce: u64,
    },
}

/// Which workflows to load and the event to evaluate them against
#[derive(Args, Debug, Clone)]
pub struct EventArgs {
    /// Workflow files (default: every workflow under .ciflow/)
    #[clap(short, long = "workflow", value_name = "FILE")]
    pub workflows: Vec<PathBuf>,

    /// Event kind: push or pull_request
    #[clap(long, default_value = "push")]
    pub event: EventKind,

    /// Branch pushed to, or the pull request's target branch
    #[clap(short, long)]
    pub branch: String,

    /// Pull request base branch
    #[clap(long)]
    pub base: Option<String>,
}

impl EventArgs {
    pub fn to_event(&self) -> crate::pipeline::Event {
        crate::pipeline::Event {
            kind: self.event,
            branch: self.branch.clone(),
            base: self.base.clone(),
        }
    }
}

/// Where and how jobs execute
#[derive(Args, Debug, Clone)]
pub struct ExecutionArgs {
    /// Source tree every job workspace is seeded from (default: current directory)
    #[clap(long, value_name = "DIR")]
    pub source: Option<PathBuf>,

    /// Maximum number of jobs running at once
    #[clap(short, long, env = "CIFLOW_JOBS")]
    pub jobs: Option<usize>,

    /// Keep cache entries in memory for this run only
    #[clap(long)]
    pub no_cache: bool,

    /// Cache store root
    #[clap(long, env = "CIFLOW_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

impl ExecutionArgs {
    /// Canonical source tree
    pub fn source_dir(&self) -> CiflowResult<PathBuf> {
        let source = match &self.source {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        source.canonicalize().map_err(|e| CiflowError::Workspace {
            message: format!("Source tree '{}': {}", source.display(), e),
        })
    }

    /// Open the cache store; the returned path is its root on disk
    pub fn open_cache(&self) -> CiflowResult<(CacheManager, Option<PathBuf>)> {
        if self.no_cache {
            return Ok((Arc::new(MemoryCache::new()), None));
        }

        let root = self.cache_dir.clone().unwrap_or_else(default_cache_dir);
        let cache = FilesystemCache::new(root)?;
        let root = cache.root().canonicalize().unwrap_or_else(|_| cache.root().to_path_buf());
        Ok((Arc::new(cache), Some(root)))
    }
}

/// Build a job executor over the shell runner
pub fn job_executor(source: PathBuf, cache: CacheManager, cache_root: Option<&Path>) -> JobExecutor {
    let executor = JobExecutor::new(Arc::new(ShellRunner::new()), cache, source);
    match cache_root {
        Some(root) => executor.exclude(root.to_path_buf()),
        None => executor,
    }
}

/// Cache management actions
#[derive(Subcommand, Debug, Clone)]
pub enum CacheAction {
    /// Show cache statistics
    Stats,

    /// Clear the cache
    Clear {
        /// Skip confirmation
        #[clap(short, long)]
        yes: bool,
    },

    /// List cached entries
    List,

    /// Remove one entry
    Remove {
        /// Entry key, as shown by 'ciflow cache list'
        key: String,
    },
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Workflow files to load: the given paths, or every `*.yml`, `*.yaml` and
/// `*.toml` under `.ciflow/`
pub fn resolve_workflows(paths: &[PathBuf]) -> CiflowResult<Vec<PathBuf>> {
    if !paths.is_empty() {
        return Ok(paths.to_vec());
    }

    let mut found = Vec::new();
    for extension in ["yml", "yaml", "toml"] {
        let pattern = format!("{}/*.{}", WORKFLOW_DIR, extension);
        let entries = glob::glob(&pattern).map_err(|e| CiflowError::BranchPattern {
            pattern: pattern.clone(),
            message: e.msg.to_string(),
        })?;
        found.extend(entries.filter_map(Result::ok).filter(|p| p.is_file()));
    }
    found.sort();

    if found.is_empty() {
        return Err(CiflowError::WorkflowNotFound {
            path: PathBuf::from(WORKFLOW_DIR),
        });
    }
    Ok(found)
}

/// Load and validate workflows. Any invalid workflow fails the whole set.
pub fn load_workflows(paths: &[PathBuf]) -> CiflowResult<Vec<PreparedPipeline>> {
    resolve_workflows(paths)?
        .iter()
        .map(|path| PreparedPipeline::load(path))
        .collect()
}

/// Exit code for a command that ended in an error.
///
/// Configuration errors and usage mistakes such as an existing starter
/// workflow get [`EXIT_CONFIGURATION`]. Any other engine error, like a
/// failed worker task or an unwritable cache store, gets [`EXIT_INTERNAL`].
pub fn exit_code_for(report: &miette::Report) -> i32 {
    match report.downcast_ref::<CiflowError>() {
        Some(error) if !error.is_configuration() => EXIT_INTERNAL,
        _ => EXIT_CONFIGURATION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::parse_from([
            "ciflow", "run", "--event", "pull_request", "--branch", "main", "--base", "fix",
            "-w", "a.yml", "-w", "b.toml", "-j", "4", "--format", "json",
        ]);

        match cli.command {
            Commands::Run {
                event,
                execution,
                format,
            } => {
                let event = event.to_event();
                assert_eq!(event.kind, EventKind::PullRequest);
                assert_eq!(event.branch, "main");
                assert_eq!(event.base.as_deref(), Some("fix"));
                assert_eq!(execution.jobs, Some(4));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_branch_is_required() {
        assert!(Cli::try_parse_from(["ciflow", "run"]).is_err());
    }

    #[test]
    fn test_explicit_workflows_are_kept() {
        let paths = vec![PathBuf::from("x.yml")];
        assert_eq!(resolve_workflows(&paths).unwrap(), paths);
    }
    #[test]
    fn test_exit_code_separates_error_classes() {
        let configuration = miette::Report::new(CiflowError::EmptyRun);
        assert_eq!(exit_code_for(&configuration), EXIT_CONFIGURATION);

        let usage = miette::miette!("ci.yml already exists");
        assert_eq!(exit_code_for(&usage), EXIT_CONFIGURATION);

        let worker = miette::Report::new(CiflowError::Worker {
            message: "job task panicked".into(),
        });
        assert_eq!(exit_code_for(&worker), EXIT_INTERNAL);

        let store = miette::Report::new(CiflowError::cache(
            "Failed to create cache directory",
            "permission denied",
        ));
        assert_eq!(exit_code_for(&store), EXIT_INTERNAL);
    }
}
