//! Test configuration helpers for pointing a downloader at a mock server

use std::path::Path;
use std::time::Duration;
use vocab_fetch::config::RetryConfig;
use vocab_fetch::{Config, VocabDownloader};
use wiremock::MockServer;

/// Config aimed at `server`, with scratch and cache under `dir` and near-zero backoff
///
/// The cache is disabled so every lookup reaches the mock server, and
/// ffmpeg is never used so audio runs produce WAV output.
pub fn test_config(server: &MockServer, dir: &Path) -> Config {
    let mut config = Config::default();
    config.fetch.base_url = server.uri();
    config.fetch.cache_dir = None;
    config.temp_dir = dir.join("tmp");
    config.retry = RetryConfig {
        max_attempts: 3,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config.audio.ffmpeg_path = None;
    config.audio.search_path = false;
    config
}

/// Downloader built from [`test_config`]
pub async fn test_downloader(server: &MockServer, dir: &Path) -> VocabDownloader {
    VocabDownloader::new(test_config(server, dir))
        .await
        .expect("failed to create downloader")
}

/// Scratch directories left behind under the config's temp dir
pub fn leftover_scratch(dir: &Path) -> usize {
    std::fs::read_dir(dir.join("tmp"))
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0)
}
