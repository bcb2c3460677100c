//! Pipeline orchestration: submission window, completion handling and batch flushing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::config::FailurePolicy;
use crate::error::{Error, FetchError, Result};
use crate::sink::BatchSink;
use crate::types::{Event, FailedItem, ItemOutcome, RunOutcome, RunState, WorkItem};

use super::assembler::{Assembler, Batch};
use super::finalization;
use super::progress::ProgressCadence;
use super::reorder::ReorderBuffer;
use super::scratch::Scratch;
use super::{Pipeline, PipelineRunState};

/// Wakes the loop so quiet-period recovery can widen the window while waiting
const RECOVERY_TICK: Duration = Duration::from_millis(250);

/// A finished fetch task: the item's outcomes plus the sink's fragments for it
pub(super) struct Completion<F> {
    outcome: ItemOutcome,
    fragments: Result<Vec<F>>,
}

/// Everything a run accumulates for the final summary.
#[derive(Default)]
pub(super) struct RunLedger {
    pub(super) parts: Vec<PathBuf>,
    pub(super) failed: Vec<FailedItem>,
}

enum LoopExit {
    Finished,
    Cancelled,
    Failed(Error),
}

enum Wake<F> {
    Cancelled,
    Joined(std::result::Result<Result<Completion<F>>, tokio::task::JoinError>),
    Tick,
}

/// Top-level run lifecycle.
///
/// Phases:
/// 1. Enter Running, report initial progress
/// 2. Create scratch storage
/// 3. Drive the submission/completion loop
/// 4. Finalize as completed, failed or cancelled
pub(super) async fn run_pipeline<S: BatchSink>(
    pipeline: &mut Pipeline<S>,
    items: Vec<WorkItem>,
) -> Result<RunOutcome> {
    let total = items.len();
    pipeline.run = PipelineRunState {
        state: RunState::Running,
        ..Default::default()
    };
    let concurrency = pipeline.limiter.current_limit();
    tracing::info!(label = %pipeline.label, total, concurrency, "starting run");
    pipeline.emit(Event::RunStarted {
        label: pipeline.label.clone(),
        total,
        concurrency,
    });

    let mut cadence = ProgressCadence::new(pipeline.assembly.progress_every);
    report_progress(pipeline, &mut cadence, total);

    let scratch = match Scratch::create(&pipeline.temp_dir).await {
        Ok(scratch) => scratch,
        Err(e) => return finalization::fail(pipeline, None, e).await,
    };

    let mut ledger = RunLedger::default();
    match drive(pipeline, items, &scratch, &mut ledger, &mut cadence).await {
        LoopExit::Finished => finalization::complete(pipeline, scratch, ledger, total).await,
        LoopExit::Cancelled => finalization::cancel(pipeline, scratch, total).await,
        LoopExit::Failed(e) => finalization::fail(pipeline, Some(scratch), e).await,
    }
}

async fn drive<S: BatchSink>(
    pipeline: &mut Pipeline<S>,
    items: Vec<WorkItem>,
    scratch: &Scratch,
    ledger: &mut RunLedger,
    cadence: &mut ProgressCadence,
) -> LoopExit {
    let total = items.len();
    let cancel = pipeline.cancel.clone();
    let mut pending = items.into_iter();
    let mut tasks: JoinSet<Result<Completion<S::Fragment>>> = JoinSet::new();
    let mut reorder = ReorderBuffer::new();
    let mut assembler = Assembler::new(&pipeline.assembly, total);
    let mut tick = tokio::time::interval(RECOVERY_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        if cancel.is_cancelled() {
            break LoopExit::Cancelled;
        }
        if pipeline.run.processed == total {
            break LoopExit::Finished;
        }

        pipeline.limiter.try_recover();
        submit_window(pipeline, &mut pending, &mut tasks);

        let wake = tokio::select! {
            biased;
            _ = cancel.cancelled() => Wake::Cancelled,
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => Wake::Joined(joined),
            _ = tick.tick() => Wake::Tick,
        };

        match wake {
            Wake::Cancelled | Wake::Tick => {}
            // A fetch that observed cancellation reports cancelled parts, not failures
            Wake::Joined(Ok(_)) if cancel.is_cancelled() => {
                break LoopExit::Cancelled;
            }
            Wake::Joined(Ok(Ok(completion))) => {
                pipeline.run.completed += 1;
                let index = completion.outcome.item.index;
                if let Err(rejected) = reorder.complete(index, completion) {
                    tracing::warn!(index, %rejected, "ignoring completion");
                    continue;
                }
                let released = release(
                    pipeline,
                    &mut reorder,
                    &mut assembler,
                    scratch,
                    ledger,
                    cadence,
                    total,
                )
                .await;
                if let Err(e) = released {
                    break LoopExit::Failed(e);
                }
            }
            Wake::Joined(Ok(Err(e))) => break LoopExit::Failed(e),
            Wake::Joined(Err(e)) => {
                break LoopExit::Failed(Error::Worker(e.to_string()));
            }
        }
    };

    match exit {
        LoopExit::Cancelled => {
            pipeline.run.cancelled = true;
            // In-flight fetches finish or time out on their own; results are discarded
            tasks.detach_all();
            LoopExit::Cancelled
        }
        LoopExit::Failed(e) => {
            tasks.abort_all();
            LoopExit::Failed(e)
        }
        LoopExit::Finished => match assembler.finish() {
            Some(batch) => match flush(pipeline, batch, scratch, ledger).await {
                Ok(()) => LoopExit::Finished,
                Err(e) => LoopExit::Failed(e),
            },
            None => LoopExit::Finished,
        },
    }
}

/// Spawn fetch tasks while the in-flight window has room
fn submit_window<S: BatchSink>(
    pipeline: &mut Pipeline<S>,
    pending: &mut std::vec::IntoIter<WorkItem>,
    tasks: &mut JoinSet<Result<Completion<S::Fragment>>>,
) {
    let window = pipeline.window();
    while pipeline.run.submitted - pipeline.run.processed < window {
        if pipeline.cancel.is_cancelled() {
            break;
        }
        let Some(item) = pending.next() else {
            break;
        };

        let fetcher = Arc::clone(&pipeline.fetcher);
        let sink = Arc::clone(&pipeline.sink);
        let cancel = pipeline.cancel.clone();
        tasks.spawn(async move {
            let outcome = fetcher.fetch_item(item, &cancel).await;
            // Decoding and resampling are CPU-bound
            let (outcome, fragments) = tokio::task::spawn_blocking(move || {
                let fragments = sink.fragments(&outcome);
                (outcome, fragments)
            })
            .await
            .map_err(|e| Error::Worker(format!("fragment conversion failed: {e}")))?;
            Ok::<_, Error>(Completion { outcome, fragments })
        });
        pipeline.run.submitted += 1;
    }
}

/// Assemble every completion the reorder buffer can release
async fn release<S: BatchSink>(
    pipeline: &mut Pipeline<S>,
    reorder: &mut ReorderBuffer<Completion<S::Fragment>>,
    assembler: &mut Assembler<S::Fragment>,
    scratch: &Scratch,
    ledger: &mut RunLedger,
    cadence: &mut ProgressCadence,
    total: usize,
) -> Result<()> {
    for (index, completion) in reorder.drain() {
        let fragments = screen_item(pipeline, completion, ledger)?;
        tracing::trace!(index, fragments = fragments.len(), "releasing item");

        pipeline.run.processed += 1;
        if let Some(batch) = assembler.push(fragments) {
            flush(pipeline, batch, scratch, ledger).await?;
        }
        report_progress(pipeline, cadence, total);
    }
    Ok(())
}

/// Apply the failure policy to a released item and return its fragments
fn screen_item<S: BatchSink>(
    pipeline: &Pipeline<S>,
    completion: Completion<S::Fragment>,
    ledger: &mut RunLedger,
) -> Result<Vec<S::Fragment>> {
    let Completion { outcome, fragments } = completion;
    let item = &outcome.item;

    let (fragments, failure) = match fragments {
        Ok(fragments) if outcome.is_failed() => {
            let attempts = outcome
                .parts
                .iter()
                .map(|(_, o)| o.attempts)
                .max()
                .unwrap_or(0);
            let error = FetchError::RetriesExhausted {
                key: item.key.clone(),
                attempts,
                last_error: outcome.first_error().unwrap_or("fetch failed").to_string(),
            };
            (fragments, Some(Error::Fetch(error)))
        }
        Ok(fragments) => (fragments, None),
        Err(e) => (Vec::new(), Some(e)),
    };

    let Some(error) = failure else {
        return Ok(fragments);
    };

    match pipeline.failure_policy {
        FailurePolicy::Abort => {
            tracing::error!(index = item.index, key = %item.key, error = %error, "item failed, aborting run");
            Err(error)
        }
        FailurePolicy::Skip => {
            tracing::warn!(index = item.index, key = %item.key, error = %error, "item failed, skipping");
            let message = error.to_string();
            pipeline.emit(Event::ItemFailed {
                index: item.index,
                key: item.key.clone(),
                error: message.clone(),
            });
            ledger.failed.push(FailedItem {
                index: item.index,
                key: item.key.clone(),
                error: message,
            });
            Ok(fragments)
        }
    }
}

/// Persist a full batch to scratch storage
async fn flush<S: BatchSink>(
    pipeline: &Pipeline<S>,
    batch: Batch<S::Fragment>,
    scratch: &Scratch,
    ledger: &mut RunLedger,
) -> Result<()> {
    let (seq, items, size) = (batch.seq, batch.items, batch.size);
    let part = pipeline.sink.persist_batch(scratch, batch).await?;
    tracing::debug!(seq, items, size, part = %part.display(), "flushed batch");
    ledger.parts.push(part);
    pipeline.emit(Event::BatchFlushed { seq, items, size });
    Ok(())
}

fn report_progress<S: BatchSink>(
    pipeline: &Pipeline<S>,
    cadence: &mut ProgressCadence,
    total: usize,
) {
    let processed = pipeline.run.processed;
    if cadence.due(processed, total) {
        pipeline.progress.report(processed, total, &pipeline.label);
        pipeline.emit(Event::Progress {
            processed,
            total,
            label: pipeline.label.clone(),
        });
    }
}
