// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Error types
//!
//! Only configuration and infrastructure problems are errors. A job that
//! fails, times out or is cancelled is reported through
//! [`JobOutcome`](crate::pipeline::JobOutcome), never through this type.

mod recovery;

pub use recovery::RecoverySuggestion;

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for ciflow operations
pub type CiflowResult<T> = Result<T, CiflowError>;

/// Main error type for ciflow
#[derive(Error, Debug, Diagnostic)]
pub enum CiflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Workflow file not found: {path}")]
    #[diagnostic(
        code(ciflow::workflow_not_found),
        help("Create a workflow with 'ciflow init' or pass one with --workflow")
    )]
    WorkflowNotFound { path: PathBuf },

    #[error("Invalid workflow '{workflow}': {reason}")]
    #[diagnostic(code(ciflow::configuration))]
    Configuration {
        workflow: String,
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Invalid branch pattern '{pattern}': {message}")]
    #[diagnostic(
        code(ciflow::branch_pattern),
        help("Branch patterns are globs, e.g. 'main' or 'release/*'")
    )]
    BranchPattern { pattern: String, message: String },

    #[error("Invalid timeout '{value}'")]
    #[diagnostic(
        code(ciflow::timeout),
        help("Use a number of minutes or a value such as '90s', '30m', '2h', '500ms'")
    )]
    InvalidTimeout { value: String },

    #[error("Job '{job}' expands to no instances")]
    #[diagnostic(
        code(ciflow::empty_expansion),
        help("Every matrix axis needs at least one value")
    )]
    EmptyExpansion { job: String },

    #[error("No job instances resolved for this run")]
    #[diagnostic(
        code(ciflow::empty_run),
        help("A matched workflow must declare at least one job")
    )]
    EmptyRun,

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Infrastructure Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to spawn '{shell}': {error}")]
    #[diagnostic(code(ciflow::spawn_failed))]
    SpawnFailed {
        shell: String,
        error: String,
        #[help]
        help: Option<String>,
    },

    #[error("Workspace error: {message}")]
    #[diagnostic(code(ciflow::workspace))]
    Workspace { message: String },

    #[error("Worker task failed: {message}")]
    #[diagnostic(code(ciflow::worker))]
    Worker { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Cache Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Cache error: {message}")]
    #[diagnostic(code(ciflow::cache_error))]
    CacheError { message: String },

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(ciflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(ciflow::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(ciflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(ciflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(ciflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(ciflow::toml_error))]
    Toml { message: String },
}

impl From<std::io::Error> for CiflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for CiflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for CiflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for CiflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl CiflowError {
    /// Create a configuration error without a help line
    pub fn config(workflow: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            workflow: workflow.into(),
            reason: reason.into(),
            help: None,
        }
    }

    /// Create a configuration error with a help line
    pub fn config_with_help(
        workflow: impl Into<String>,
        reason: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        Self::Configuration {
            workflow: workflow.into(),
            reason: reason.into(),
            help: Some(help.into()),
        }
    }

    /// Create a cache error from any displayable cause
    pub fn cache(context: &str, error: impl std::fmt::Display) -> Self {
        Self::CacheError {
            message: format!("{}: {}", context, error),
        }
    }

    /// Whether this error belongs to the configuration class.
    ///
    /// Configuration errors abort a run before any job starts and map to
    /// their own exit code.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::WorkflowNotFound { .. }
                | Self::Configuration { .. }
                | Self::BranchPattern { .. }
                | Self::InvalidTimeout { .. }
                | Self::EmptyExpansion { .. }
                | Self::EmptyRun
                | Self::Yaml { .. }
                | Self::Toml { .. }
        )
    }
}
