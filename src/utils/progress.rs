// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Job progress display
//!
//! Drains [`ProgressEvent`]s from a running pipeline into an indicatif bar.
//! Nothing is drawn when stdout is not a terminal.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pipeline::ProgressEvent;

/// Create a progress bar for job completion
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} jobs {wide_msg}")
    {
        pb.set_style(style.progress_chars("█▓░").tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ "));
    }
    pb
}

/// Consumes progress events until the sender side is dropped
pub struct ProgressDisplay {
    handle: JoinHandle<()>,
}

impl ProgressDisplay {
    /// Spawn the display task. `interactive` selects between a live bar and
    /// nothing at all.
    pub fn spawn(mut events: mpsc::UnboundedReceiver<ProgressEvent>, interactive: bool) -> Self {
        let handle = tokio::spawn(async move {
            let pb = create_progress_bar(0);
            if !interactive {
                pb.set_draw_target(ProgressDrawTarget::hidden());
            }
            let mut running = BTreeMap::new();

            while let Some(event) = events.recv().await {
                match event {
                    ProgressEvent::Planned { total, .. } => {
                        pb.set_length(total as u64);
                        pb.enable_steady_tick(std::time::Duration::from_millis(100));
                    }
                    ProgressEvent::JobStarted { ordinal, name } => {
                        running.insert(ordinal, name);
                    }
                    ProgressEvent::JobFinished {
                        ordinal,
                        name,
                        success,
                        label,
                    } => {
                        running.remove(&ordinal);
                        let glyph = if success { "✓".green() } else { "✗".red() };
                        pb.println(format!("  {} {} {}", glyph, name, label.dimmed()));
                        pb.inc(1);
                    }
                }
                let names: Vec<&str> = running.values().map(String::as_str).collect();
                pb.set_message(names.join(", "));
            }

            pb.finish_and_clear();
        });

        Self { handle }
    }

    /// Wait for the display to drain
    pub async fn finish(self) {
        let _ = self.handle.await;
    }
}
