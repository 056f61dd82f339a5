use std::time::Instant;

use chrono::Utc;
use decisync_core::{SyncItemError, SyncRunSummary};

/// Accumulates per-item outcomes for one run.
#[derive(Debug)]
pub struct RunTracker {
    summary: SyncRunSummary,
    clock: Instant,
}

impl RunTracker {
    pub fn start() -> Self {
        Self {
            summary: SyncRunSummary::new(Utc::now()),
            clock: Instant::now(),
        }
    }

    /// Items considered so far, whatever their outcome.
    pub fn total(&self) -> usize {
        self.summary.total
    }

    pub fn begin_item(&mut self) {
        self.summary.total += 1;
    }

    pub fn record_synced(&mut self) {
        self.summary.synced += 1;
    }

    pub fn record_skipped(&mut self) {
        self.summary.skipped += 1;
    }

    pub fn record_error(
        &mut self,
        decision_id: impl Into<String>,
        citation_number: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.summary.errors.push(SyncItemError {
            decision_id: decision_id.into(),
            citation_number: citation_number.into(),
            message: message.into(),
        });
    }

    pub fn finish(mut self) -> SyncRunSummary {
        self.summary.finished_at = Some(Utc::now());
        self.summary.duration_ms = Some(self.clock.elapsed().as_millis() as u64);
        self.summary
    }
}
