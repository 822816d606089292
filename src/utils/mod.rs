// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Utility modules
//!
//! Common utilities for the ciflow CLI.

pub mod colors;
pub mod progress;

pub use colors::*;
pub use progress::*;
