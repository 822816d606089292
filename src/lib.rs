// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! # ciflow - declarative build-verification pipelines
//!
//! `ciflow` gates a change by running a set of independent checks against a
//! source tree and reducing them to one pass/fail verdict.
//!
//! ## Features
//!
//! - **Triggers** - push and pull-request events filtered by branch globs
//! - **Matrix expansion** - one job template, many deterministic instances
//! - **Isolated jobs** - each instance runs in its own copy of the source tree
//! - **Content-keyed caches** - entries keyed by the exact bytes of lock files
//! - **Drift checks** - fail when a committed artifact no longer regenerates
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a starter workflow
//! ciflow init
//!
//! # See what a run would execute
//! ciflow plan
//!
//! # Run as if main was pushed to
//! ciflow run --branch main
//! ```

pub mod cache;
pub mod cli;
pub mod errors;
pub mod executors;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use errors::{CiflowError, CiflowResult};
pub use pipeline::{Event, PipelineDefinition, PipelineRunner, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
