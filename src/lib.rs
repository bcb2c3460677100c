//! # vocab-fetch
//!
//! Adaptive-concurrency fetcher for vocabulary word lists.
//!
//! Given an ordered word list, vocab-fetch looks up every word in the Youdao
//! dictionary service (phonetics and translations) or downloads its
//! pronunciation clips, and assembles the results in input order:
//! - **Adaptive** - the concurrency limit halves on errors and throttling, then recovers
//! - **Ordered** - completions are released strictly by input position
//! - **Bounded** - output is flushed in batches through run-scoped scratch storage
//! - **Event-driven** - consumers subscribe to events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use vocab_fetch::{Config, NoProgress, VocabDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let downloader = VocabDownloader::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let words = Path::new("data/cet4/1.json");
//!     downloader
//!         .enrich_word_list(words, words, Arc::new(NoProgress))
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog bookkeeping (data root and category configs)
pub mod catalog;
/// Adaptive concurrency limiting
pub mod concurrency;
/// Configuration types
pub mod config;
/// Top-level downloader (decomposed into focused submodules)
pub mod downloader;
/// Error types
pub mod error;
/// Dictionary and pronunciation fetching
pub mod fetch;
/// Ordered fetch-and-assemble pipeline
pub mod pipeline;
/// Retry logic with exponential backoff
pub mod retry;
/// Batch sinks and final encoders
pub mod sink;
/// Core types and events
pub mod types;
/// Word list files and tooling
pub mod wordlist;

// Re-export commonly used types
pub use concurrency::{ConcurrencyManager, Permit};
pub use config::{Config, FailurePolicy, GapPolicy, RecoveryPolicy};
pub use downloader::{CatalogReport, VocabDownloader};
pub use error::{Error, FetchError, Result, SinkError};
pub use fetch::{FetchClient, Fetcher};
pub use pipeline::{NoProgress, Pipeline, PipelineParams, ProgressReporter, RecordingProgress};
pub use sink::{AudioSink, BatchSink, JsonSink};
pub use types::{Accent, Event, Resource, RunOutcome, RunSummary, WorkItem};
pub use wordlist::{WordList, WordRecord};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's `shutdown()` method,
/// which cancels the active run.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use vocab_fetch::{Config, VocabDownloader, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = VocabDownloader::new(Config::default()).await?;
///
///     // Cancel the active run on Ctrl+C
///     tokio::spawn(run_with_shutdown(downloader.clone()));
///
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(downloader: VocabDownloader) {
    wait_for_signal().await;
    downloader.shutdown();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
