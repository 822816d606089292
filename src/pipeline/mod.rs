// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Workflow definitions and orchestration
//!
//! A run flows through this module in order: an event is checked against
//! each definition's triggers, matched jobs are expanded over their matrix,
//! instances run concurrently, and their results are aggregated into one
//! verdict.

mod aggregate;
mod cancel;
mod definition;
mod matrix;
mod runner;
mod trigger;
mod validation;
pub mod vars;

pub use aggregate::{
    log_tail, serialize_millis, FailedStep, JobOutcome, JobResult, PipelineVerdict,
    ResultAggregator, StepRecord, EXCERPT_LINES,
};
pub use cancel::{CancelToken, SupersessionRegistry};
pub use definition::*;
pub use matrix::{
    Expansion, JobInstance, MatrixAssignment, MatrixExpander, ResolvedStep, DEFAULT_RUNS_ON,
};
pub use runner::{
    PipelineRunner, PreparedPipeline, ProgressEvent, RunOptions, RunReport, RunStatus,
    EXIT_CONFIGURATION, EXIT_FAILURE, EXIT_INTERNAL, EXIT_SUCCESS,
};
pub use trigger::{Event, TriggerEvaluator};
pub use validation::{PipelineValidator, ValidationResult};
