// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Trigger evaluation

use glob::Pattern;
use serde::Serialize;
use std::fmt;

use super::definition::{EventKind, Trigger};
use crate::errors::{CiflowError, CiflowResult};

/// An incoming event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub kind: EventKind,
    /// Branch pushed to, or the pull request's target branch
    pub branch: String,
    /// Pull request base branch, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<String>,
}

impl Event {
    pub fn push(branch: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Push,
            branch: branch.into(),
            base: None,
        }
    }

    pub fn pull_request(branch: impl Into<String>, base: Option<String>) -> Self {
        Self {
            kind: EventKind::PullRequest,
            branch: branch.into(),
            base,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to '{}'", self.kind, self.branch)?;
        if let Some(base) = &self.base {
            write!(f, " (base '{}')", base)?;
        }
        Ok(())
    }
}

struct CompiledTrigger {
    kind: EventKind,
    /// Empty means every branch
    patterns: Vec<Pattern>,
}

/// Compiled trigger set of one workflow.
///
/// Patterns are compiled once, so a malformed pattern is reported when the
/// workflow is loaded and evaluation itself cannot fail.
pub struct TriggerEvaluator {
    triggers: Vec<CompiledTrigger>,
}

impl TriggerEvaluator {
    pub fn new(triggers: &[Trigger]) -> CiflowResult<Self> {
        let triggers = triggers
            .iter()
            .map(|trigger| {
                let patterns = trigger
                    .branches
                    .iter()
                    .map(|p| {
                        Pattern::new(p).map_err(|e| CiflowError::BranchPattern {
                            pattern: p.clone(),
                            message: e.msg.to_string(),
                        })
                    })
                    .collect::<CiflowResult<Vec<_>>>()?;
                Ok(CompiledTrigger {
                    kind: trigger.kind,
                    patterns,
                })
            })
            .collect::<CiflowResult<Vec<_>>>()?;

        Ok(Self { triggers })
    }

    /// Whether any trigger accepts the event.
    ///
    /// Branch patterns are matched against the event's target branch for
    /// both pushes and pull requests.
    pub fn matches(&self, event: &Event) -> bool {
        self.triggers.iter().any(|trigger| {
            trigger.kind == event.kind
                && (trigger.patterns.is_empty()
                    || trigger.patterns.iter().any(|p| p.matches(&event.branch)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(kind: EventKind, branches: &[&str]) -> Trigger {
        Trigger {
            kind,
            branches: branches.iter().map(|b| b.to_string()).collect(),
        }
    }

    fn main_only() -> TriggerEvaluator {
        TriggerEvaluator::new(&[
            trigger(EventKind::Push, &["main"]),
            trigger(EventKind::PullRequest, &["main"]),
        ])
        .unwrap()
    }

    #[test]
    fn test_push_to_other_branch_does_not_match() {
        assert!(!main_only().matches(&Event::push("dev")));
    }

    #[test]
    fn test_push_and_pull_request_to_main() {
        let evaluator = main_only();
        assert!(evaluator.matches(&Event::push("main")));
        assert!(evaluator.matches(&Event::pull_request("main", Some("feature/x".into()))));
        assert!(!evaluator.matches(&Event::pull_request("dev", Some("main".into()))));
    }

    #[test]
    fn test_kind_must_match() {
        let evaluator = TriggerEvaluator::new(&[trigger(EventKind::PullRequest, &[])]).unwrap();
        assert!(!evaluator.matches(&Event::push("main")));
        assert!(evaluator.matches(&Event::pull_request("anything", None)));
    }

    #[test]
    fn test_glob_patterns() {
        let evaluator = TriggerEvaluator::new(&[trigger(EventKind::Push, &["release/*", "v?"])]).unwrap();
        assert!(evaluator.matches(&Event::push("release/1.2")));
        assert!(evaluator.matches(&Event::push("v2")));
        assert!(!evaluator.matches(&Event::push("main")));
    }

    #[test]
    fn test_malformed_pattern_fails_at_construction() {
        let err = TriggerEvaluator::new(&[trigger(EventKind::Push, &["release/["])])
            .err()
            .unwrap();
        assert!(matches!(err, CiflowError::BranchPattern { ref pattern, .. } if pattern == "release/["));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_event_display() {
        assert_eq!(
            Event::pull_request("main", Some("fix".into())).to_string(),
            "pull_request to 'main' (base 'fix')"
        );
    }
}
