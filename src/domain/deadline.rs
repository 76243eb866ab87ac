//! Run deadline
//!
//! Long syncs stop cleanly between pages and sessions once the configured
//! budget is spent, returning what they have so far.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct SyncDeadline {
    started: Instant,
    budget: Option<Duration>,
}

impl SyncDeadline {
    pub fn start(budget: Option<Duration>) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    pub fn unbounded() -> Self {
        Self::start(None)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.budget.is_some_and(|budget| self.elapsed() >= budget)
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.budget.map(|budget| budget.saturating_sub(self.elapsed()))
    }
}

impl Default for SyncDeadline {
    fn default() -> Self {
        Self::unbounded()
    }
}
