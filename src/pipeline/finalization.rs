//! Run finalization: combine parts on success, clean up scratch storage on every ending.

use crate::error::{Error, Result};
use crate::sink::BatchSink;
use crate::types::{Event, RunOutcome, RunState, RunSummary};

use super::Pipeline;
use super::orchestration::RunLedger;
use super::scratch::Scratch;

/// Combine every persisted part into the artifact and mark the run completed.
///
/// A combine failure turns the run into a failed one.
pub(super) async fn complete<S: BatchSink>(
    pipeline: &mut Pipeline<S>,
    scratch: Scratch,
    ledger: RunLedger,
    total: usize,
) -> Result<RunOutcome> {
    let RunLedger { parts, failed } = ledger;
    let batches = parts.len();

    let artifact = match pipeline.sink.combine(&scratch, parts).await {
        Ok(artifact) => artifact,
        Err(e) => return fail(pipeline, Some(scratch), e.into()).await,
    };
    scratch.cleanup().await;

    let processed = pipeline.run.processed;
    if !failed.is_empty() {
        tracing::warn!(
            label = %pipeline.label,
            failed = failed.len(),
            processed,
            "run completed with skipped items"
        );
    }
    tracing::info!(
        label = %pipeline.label,
        artifact = %artifact.display(),
        processed,
        batches,
        "run completed"
    );

    pipeline.run.state = RunState::Completed;
    pipeline.emit(Event::RunCompleted {
        artifact: artifact.clone(),
        processed,
        failed: failed.len(),
    });

    Ok(RunOutcome::Completed(RunSummary {
        artifact,
        total,
        processed,
        batches,
        final_limit: pipeline.limiter.current_limit(),
        failed,
    }))
}

/// Discard scratch storage and return the error.
pub(super) async fn fail<S: BatchSink>(
    pipeline: &mut Pipeline<S>,
    scratch: Option<Scratch>,
    error: Error,
) -> Result<RunOutcome> {
    if let Some(scratch) = scratch {
        scratch.cleanup().await;
    }
    tracing::error!(label = %pipeline.label, error = %error, "run failed");

    pipeline.run.state = RunState::Failed;
    pipeline.emit(Event::RunFailed {
        error: error.to_string(),
    });
    Err(error)
}

/// Discard scratch storage; no artifact is produced.
pub(super) async fn cancel<S: BatchSink>(
    pipeline: &mut Pipeline<S>,
    scratch: Scratch,
    total: usize,
) -> Result<RunOutcome> {
    scratch.cleanup().await;

    let processed = pipeline.run.processed;
    tracing::info!(label = %pipeline.label, processed, total, "run cancelled");

    pipeline.run.state = RunState::Cancelled;
    pipeline.emit(Event::RunCancelled { processed, total });
    Ok(RunOutcome::Cancelled { processed, total })
}
