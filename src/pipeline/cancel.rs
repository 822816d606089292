// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 ciflow contributors

//! Run-level cancellation
//!
//! A [`CancelToken`] is a broadcast flag shared by every job of a run. Jobs
//! check it between steps and race it against the step in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::info;

/// Shared cancellation flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { state: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives as long as `self`, so this only returns on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

/// Tracks the run in flight per branch so a newer event supersedes it
#[derive(Debug, Default)]
pub struct SupersessionRegistry {
    active: Mutex<HashMap<String, CancelToken>>,
}

impl SupersessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run for `branch`, cancelling the one already in flight
    pub fn begin(&self, branch: &str) -> CancelToken {
        let token = CancelToken::new();
        let previous = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(branch.to_string(), token.clone());

        if let Some(previous) = previous {
            if !previous.is_cancelled() {
                info!("Superseding in-flight run on branch '{}'", branch);
            }
            previous.cancel();
        }

        token
    }

    /// Forget a finished run, unless a newer one already replaced it
    pub fn finish(&self, branch: &str, token: &CancelToken) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.get(branch).is_some_and(|t| t.same_as(token)) {
            active.remove(branch);
        }
    }

    /// Number of branches with a run in flight
    pub fn in_flight(&self) -> usize {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        assert!(!token.is_cancelled());
        token.cancel();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves_immediately() {
        let token = CancelToken::new();
        token.cancel();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_newer_run_supersedes_same_branch() {
        let registry = SupersessionRegistry::new();
        let first = registry.begin("main");
        let other = registry.begin("dev");
        let second = registry.begin("main");

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!other.is_cancelled());
        assert_eq!(registry.in_flight(), 2);
    }

    #[test]
    fn test_finish_keeps_newer_run() {
        let registry = SupersessionRegistry::new();
        let first = registry.begin("main");
        let second = registry.begin("main");

        registry.finish("main", &first);
        assert_eq!(registry.in_flight(), 1);

        registry.finish("main", &second);
        assert_eq!(registry.in_flight(), 0);
    }
}
