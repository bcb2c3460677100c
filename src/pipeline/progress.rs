//! Progress reporting

use std::sync::Mutex;

/// Receives `(processed, total, label)` updates; side-effect only
pub trait ProgressReporter: Send + Sync {
    /// Called with monotonically increasing `processed`
    fn report(&self, processed: usize, total: usize, label: &str);
}

/// Reporter that discards updates
#[derive(Clone, Copy, Debug, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _processed: usize, _total: usize, _label: &str) {}
}

/// Reporter that records every update, for tests and summaries
#[derive(Debug, Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<(usize, usize)>>,
}

impl RecordingProgress {
    /// Updates received so far
    pub fn updates(&self) -> Vec<(usize, usize)> {
        self.updates
            .lock()
            .map(|u| u.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, processed: usize, total: usize, _label: &str) {
        let mut updates = self
            .updates
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        updates.push((processed, total));
    }
}

/// Decides when the orchestrator emits progress
#[derive(Clone, Copy, Debug)]
pub(crate) struct ProgressCadence {
    every: usize,
    last: Option<usize>,
}

impl ProgressCadence {
    pub(crate) fn new(every: usize) -> Self {
        Self {
            every: every.max(1),
            last: None,
        }
    }

    /// True at the start, every `every` items and at the end, never twice for one count
    pub(crate) fn due(&mut self, processed: usize, total: usize) -> bool {
        if self.last == Some(processed) {
            return false;
        }
        let due = processed == 0 || processed == total || processed % self.every == 0;
        if due {
            self.last = Some(processed);
        }
        due
    }
}
