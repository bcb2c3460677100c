//! Fetch-and-assemble pipeline
//!
//! Split into focused submodules:
//! - [`reorder`] - In-order release of out-of-order completions
//! - [`assembler`] - Size/count bounded batching of released fragments
//! - [`scratch`] - Run-scoped temporary storage for batch parts
//! - [`progress`] - Progress reporter interface
//! - `orchestration` - Submission window, completion handling, flushing
//! - `finalization` - Completed / failed / cancelled run endings

pub mod assembler;
mod finalization;
mod orchestration;
pub mod progress;
pub mod reorder;
pub mod scratch;


pub use assembler::{Assembler, Batch, Fragment};
pub use progress::{NoProgress, ProgressReporter, RecordingProgress};
pub use reorder::ReorderBuffer;
pub use scratch::Scratch;

use crate::concurrency::ConcurrencyManager;
use crate::config::{AssemblyConfig, ConcurrencyConfig, FailurePolicy};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::sink::BatchSink;
use crate::types::{Event, RunOutcome, RunState, WorkItem};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Counters of a single run, owned by the orchestrator task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineRunState {
    /// Items handed to fetch tasks
    pub submitted: usize,
    /// Fetch tasks that finished
    pub completed: usize,
    /// Items released in order and assembled
    pub processed: usize,
    /// Whether cancellation was observed
    pub cancelled: bool,
    /// Lifecycle state
    pub state: RunState,
}

impl Default for PipelineRunState {
    fn default() -> Self {
        Self {
            submitted: 0,
            completed: 0,
            processed: 0,
            cancelled: false,
            state: RunState::Idle,
        }
    }
}

/// Parameters for [`Pipeline::new`]
pub struct PipelineParams<S: BatchSink> {
    /// Label used in progress updates and events
    pub label: String,
    /// Per-item fetcher
    pub fetcher: Arc<dyn Fetcher>,
    /// Batch sink for this flavor
    pub sink: Arc<S>,
    /// Shared adaptive limiter (the same one the fetcher reports to)
    pub limiter: Arc<ConcurrencyManager>,
    /// Window sizing
    pub concurrency: ConcurrencyConfig,
    /// Batching and progress cadence
    pub assembly: AssemblyConfig,
    /// What to do with items that exhaust their retries
    pub failure_policy: FailurePolicy,
    /// Parent directory for scratch storage
    pub temp_dir: PathBuf,
    /// Progress sink
    pub progress: Arc<dyn ProgressReporter>,
    /// Event channel
    pub event_tx: broadcast::Sender<Event>,
    /// Cancels the run
    pub cancel: CancellationToken,
}

/// One fetch-and-assemble run over an ordered input
///
/// State machine: `Idle -> Running -> {Completed | Failed | Cancelled}`.
pub struct Pipeline<S: BatchSink> {
    label: String,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<S>,
    limiter: Arc<ConcurrencyManager>,
    concurrency: ConcurrencyConfig,
    assembly: AssemblyConfig,
    failure_policy: FailurePolicy,
    temp_dir: PathBuf,
    progress: Arc<dyn ProgressReporter>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
    run: PipelineRunState,
}

impl<S: BatchSink> Pipeline<S> {
    /// Create an idle pipeline
    pub fn new(params: PipelineParams<S>) -> Self {
        let PipelineParams {
            label,
            fetcher,
            sink,
            limiter,
            concurrency,
            assembly,
            failure_policy,
            temp_dir,
            progress,
            event_tx,
            cancel,
        } = params;

        Self {
            label,
            fetcher,
            sink,
            limiter,
            concurrency,
            assembly,
            failure_policy,
            temp_dir,
            progress,
            event_tx,
            cancel,
            run: PipelineRunState::default(),
        }
    }

    /// Current counters and state
    pub fn run_state(&self) -> PipelineRunState {
        self.run
    }

    /// Process `items` (indices `0..len` in order) and produce the artifact
    ///
    /// Cancellation is not an error: it yields [`RunOutcome::Cancelled`].
    /// A fatal item under [`FailurePolicy::Abort`] or any sink failure
    /// returns `Err` after scratch storage has been removed.
    pub async fn run(&mut self, items: Vec<WorkItem>) -> Result<RunOutcome> {
        orchestration::run_pipeline(self, items).await
    }

    /// Window of submitted-but-unreleased items allowed right now
    pub(crate) fn window(&self) -> usize {
        (self.limiter.current_limit() * self.concurrency.window_factor)
            .min(self.concurrency.window_cap)
            .max(1)
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
