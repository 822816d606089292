// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Init command - write a starter workflow

use colored::Colorize;
use miette::Result;
use std::path::Path;

use super::WORKFLOW_DIR;

/// Starter workflow for a Cargo workspace
pub const STARTER_WORKFLOW: &str = r#"# ciflow workflow
name: CI

on:
  push:
    branches: [main]
  pull_request:
    branches: [main]

env:
  CARGO_TERM_COLOR: always

jobs:
  fmt:
    timeout: 10m
    steps:
      - name: Check formatting
        run: cargo fmt --all -- --check

  test:
    runs_on: ${{ matrix.os }}
    timeout: 30m
    matrix:
      os: [ubuntu-latest, macos-latest, windows-latest]
    steps:
      - name: Test
        run: cargo test --verbose
        inputs:
          build:
            namespace: cargo-${{ matrix.os }}
            files: [Cargo.lock]
            path: target
      - name: Save build cache
        save_cache:
          namespace: cargo-${{ matrix.os }}
          files: [Cargo.lock]
          path: target

  check:
    timeout: 30m
    matrix:
      target: [x86_64-unknown-linux-gnu, aarch64-unknown-linux-gnu, wasm32-unknown-unknown]
    env:
      RUSTFLAGS: -D warnings
    steps:
      - name: Clippy
        run: cargo clippy --target ${{ matrix.target }} --all-targets

  docs:
    timeout: 20m
    env:
      RUSTDOCFLAGS: -D warnings
    steps:
      - name: Build docs
        run: cargo doc --workspace --no-deps --document-private-items

  lockfile:
    timeout: 10m
    steps:
      - name: Lockfile is current
        drift_check:
          artifact: Cargo.lock
          regenerate: cargo update --workspace
"#;

/// Run the init command
pub async fn run(force: bool, verbose: bool) -> Result<()> {
    let path = Path::new(WORKFLOW_DIR).join("ci.yml");

    println!("{}", "Initializing ciflow...".bold());
    println!();

    if path.exists() && !force {
        return Err(miette::miette!(
            "{} already exists. Use --force to overwrite it.",
            path.display()
        ));
    }

    std::fs::create_dir_all(WORKFLOW_DIR).map_err(|e| {
        miette::miette!("Failed to create directory '{}': {}", WORKFLOW_DIR, e)
    })?;
    std::fs::write(&path, STARTER_WORKFLOW)
        .map_err(|e| miette::miette!("Failed to write {}: {}", path.display(), e))?;

    println!("  {} Created {}", "✓".green(), path.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to match your project", path.display().to_string().cyan());
    println!("  2. Run {} to check it", "ciflow validate".cyan());
    println!("  3. Run {} to execute it", "ciflow run --branch main".cyan());
    println!();

    if verbose {
        println!("{}", "Generated workflow:".dimmed());
        println!("{}", "─".repeat(50).dimmed());
        println!("{}", STARTER_WORKFLOW.dimmed());
    }

    Ok(())
}
