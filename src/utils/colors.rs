// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Terminal color utilities

use colored::{ColoredString, Colorize};

use crate::pipeline::JobOutcome;

/// Status glyph for a job outcome
pub fn outcome_glyph(outcome: &JobOutcome) -> ColoredString {
    match outcome {
        JobOutcome::Success => "✓".green(),
        JobOutcome::Failure { .. } => "✗".red(),
        JobOutcome::TimedOut { .. } => "⏱".yellow(),
        JobOutcome::Cancelled { .. } => "○".dimmed(),
    }
}

/// Check if colors should be used on stdout
pub fn should_use_colors() -> bool {
    // Respect NO_COLOR environment variable
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    console::Term::stdout().features().colors_supported()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_outcome_glyphs() {
        colored::control::set_override(false);

        assert_eq!(outcome_glyph(&JobOutcome::Success).to_string(), "✓");
        assert_eq!(
            outcome_glyph(&JobOutcome::TimedOut {
                step: None,
                after: Duration::from_secs(1)
            })
            .to_string(),
            "⏱"
        );
        assert_eq!(outcome_glyph(&JobOutcome::Cancelled { step: None }).to_string(), "○");
    }
}
