//! Top-level downloader split into focused submodules.
//!
//! The `VocabDownloader` struct and its methods are organized by domain:
//! - [`runs`] - Dictionary enrichment and pronunciation synthesis runs
//! - [`catalog`] - Walking a data root and enriching pending files in place

mod catalog;
mod runs;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use catalog::CatalogReport;

use crate::concurrency::ConcurrencyManager;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::FetchClient;
use crate::pipeline::{Pipeline, PipelineParams, ProgressReporter};
use crate::sink::BatchSink;
use crate::types::{Event, Resource, RunOutcome, WorkItem};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct VocabDownloader {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Cancelled on shutdown; each run observes a child token
    pub(crate) shutdown: CancellationToken,
}

impl VocabDownloader {
    /// Create a new VocabDownloader instance
    ///
    /// Validates the configuration, creates the scratch and cache
    /// directories and sets up the event broadcast channel.
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.temp_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.temp_dir.display(),
                        e
                    ),
                ))
            })?;
        if let Some(cache_dir) = &config.fetch.cache_dir {
            tokio::fs::create_dir_all(cache_dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create cache directory '{}': {}",
                        cache_dir.display(),
                        e
                    ),
                ))
            })?;
        }

        // Buffer of 1000 events so slow subscribers rarely lag
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        Ok(Self {
            event_tx,
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribe to pipeline events
    ///
    /// Each subscriber receives every event emitted after it subscribed.
    /// A subscriber that falls more than 1000 events behind sees
    /// `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Cancel the active run (and any later one)
    ///
    /// The run stops submitting, discards its scratch storage and returns
    /// [`RunOutcome::Cancelled`].
    pub fn shutdown(&self) {
        tracing::info!("Initiating shutdown");
        self.shutdown.cancel();
    }

    /// Whether [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Build a limiter, fetcher and pipeline for one run and drive it to an outcome
    ///
    /// Every run starts from `initial_concurrency`; throttling seen by an
    /// earlier run does not carry over.
    async fn run_pipeline<S: BatchSink>(
        &self,
        label: String,
        resources: Vec<Resource>,
        sink: Arc<S>,
        items: Vec<WorkItem>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Result<RunOutcome> {
        let limiter = Arc::new(
            ConcurrencyManager::new(&self.config.concurrency).with_events(self.event_tx.clone()),
        );
        let fetcher = FetchClient::new(&self.config, resources, Arc::clone(&limiter))?;

        let mut pipeline = Pipeline::new(PipelineParams {
            label,
            fetcher: Arc::new(fetcher),
            sink,
            limiter,
            concurrency: self.config.concurrency.clone(),
            assembly: self.config.assembly.clone(),
            failure_policy: self.config.fetch.failure_policy,
            temp_dir: self.config.temp_dir.clone(),
            progress,
            event_tx: self.event_tx.clone(),
            cancel: self.shutdown.child_token(),
        });
        pipeline.run(items).await
    }
}
