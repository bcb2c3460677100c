//! Batch sinks
//!
//! A sink turns released item outcomes into fragments, writes each flushed
//! batch into scratch storage and finally combines all parts into one
//! artifact. Two flavors exist:
//! - [`JsonSink`] - enriched word records, combined into a word list file
//! - [`AudioSink`] - pronunciation clips, combined into a single MP3 (or WAV)

pub mod audio;
pub mod encoder;
pub mod json;
pub mod wav;

pub use audio::{AudioSink, Clip};
pub use encoder::{FfmpegEncoder, FinalEncoder, WavConcatEncoder};
pub use json::JsonSink;

use crate::error::{Result, SinkError};
use crate::pipeline::{Batch, Fragment, Scratch};
use crate::types::ItemOutcome;
use std::path::PathBuf;

/// Persists batches and combines them into the final artifact
#[async_trait::async_trait]
pub trait BatchSink: Send + Sync + 'static {
    /// Unit of output this sink assembles
    type Fragment: Fragment + Send + 'static;

    /// Convert one item's outcome into fragments, in output order
    ///
    /// Runs on the blocking thread pool once the item's fetches finished,
    /// before it reaches the reorder buffer. An error marks the item as
    /// failed.
    fn fragments(&self, outcome: &ItemOutcome) -> Result<Vec<Self::Fragment>>;

    /// Write one batch into scratch storage and return its handle
    async fn persist_batch(
        &self,
        scratch: &Scratch,
        batch: Batch<Self::Fragment>,
    ) -> std::result::Result<PathBuf, SinkError>;

    /// Combine persisted parts, in order, into the artifact
    async fn combine(
        &self,
        scratch: &Scratch,
        parts: Vec<PathBuf>,
    ) -> std::result::Result<PathBuf, SinkError>;
}
