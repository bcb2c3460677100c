//! Configuration types for vocab-fetch

use crate::error::{Error, Result};
use crate::types::Accent;
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Adaptive concurrency and submission window configuration
///
/// Groups settings that bound how many fetches may be in flight at once.
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Concurrency limit at the start of a run (default: 8)
    #[serde(default = "default_concurrency")]
    pub initial_concurrency: usize,

    /// Upper bound the limit may recover to (default: 8)
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,

    /// How the limit grows back after errors
    #[serde(default)]
    pub recovery: RecoveryPolicy,

    /// In-flight window is `current_limit * window_factor` (default: 2)
    #[serde(default = "default_window_factor")]
    pub window_factor: usize,

    /// Hard cap on the in-flight window regardless of the limit (default: 50)
    #[serde(default = "default_window_cap")]
    pub window_cap: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: default_concurrency(),
            max_concurrency: default_concurrency(),
            recovery: RecoveryPolicy::default(),
            window_factor: default_window_factor(),
            window_cap: default_window_cap(),
        }
    }
}

/// Policy for raising the concurrency limit after it was cut
///
/// Both variants halve the limit on error; they differ only in how it grows back.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Add one permit after `threshold` consecutive successes (default, threshold 10)
    SuccessStreak {
        /// Consecutive successes required per step
        threshold: u32,
    },
    /// Multiply the limit by 1.5 (plus one) after `period` without a limit change
    QuietPeriod {
        /// Quiet time required per step (default: 5 seconds)
        #[serde(default = "default_quiet_period", with = "duration_serde")]
        period: Duration,
    },
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        RecoveryPolicy::SuccessStreak { threshold: 10 }
    }
}

/// Retry configuration for transient fetch failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per request, including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubles per attempt (default: 1 second)
    #[serde(default = "default_initial_delay", with = "millis_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "millis_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// What happens to a run when an item exhausts its retries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the item as failed, keep going, report the count at the end (default)
    #[default]
    Skip,
    /// Fail the whole run immediately
    Abort,
}

/// Remote endpoint and cache configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Base URL of the dictionary service (default: "https://dict.youdao.com")
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for a dictionary lookup (default: 10 seconds)
    #[serde(default = "default_dictionary_timeout", with = "duration_serde")]
    pub dictionary_timeout: Duration,

    /// Timeout for a pronunciation clip (default: 5 seconds)
    #[serde(default = "default_audio_timeout", with = "duration_serde")]
    pub audio_timeout: Duration,

    /// HTTP statuses treated as throttling (default: 403, 429)
    #[serde(default = "default_throttle_statuses")]
    pub throttle_statuses: Vec<u16>,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Directory for cached responses (None disables the cache)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: Option<PathBuf>,

    /// Age after which a cached response is ignored (default: 30 days)
    #[serde(default = "default_cache_expiry", with = "duration_serde")]
    pub cache_expiry: Duration,

    /// Behavior when an item exhausts its retries
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            dictionary_timeout: default_dictionary_timeout(),
            audio_timeout: default_audio_timeout(),
            throttle_statuses: default_throttle_statuses(),
            user_agent: default_user_agent(),
            cache_dir: default_cache_dir(),
            cache_expiry: default_cache_expiry(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

/// Separator inserted between consecutive assembled fragments
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GapPolicy {
    /// Fixed pause in seconds (default: 0.5)
    Fixed {
        /// Pause length in seconds
        seconds: f64,
    },
    /// Pause proportional to the previous fragment's length
    Rate {
        /// Fraction of the previous fragment's duration
        multiplier: f64,
    },
}

impl Default for GapPolicy {
    fn default() -> Self {
        GapPolicy::Fixed { seconds: 0.5 }
    }
}

impl GapPolicy {
    /// Gap length in milliseconds following a fragment of `previous_ms`
    pub fn gap_ms(&self, previous_ms: u64) -> u64 {
        match *self {
            GapPolicy::Fixed { seconds } => (seconds * 1000.0).max(0.0) as u64,
            GapPolicy::Rate { multiplier } => (previous_ms as f64 * multiplier).max(0.0) as u64,
        }
    }
}

/// Batch assembly and flush configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Flush once the accumulated batch size exceeds this (default: 60000, audio milliseconds)
    #[serde(default = "default_flush_size_threshold")]
    pub flush_size_threshold: u64,

    /// Flush once the batch holds this many items (default: 50)
    #[serde(default = "default_flush_count_threshold")]
    pub flush_count_threshold: usize,

    /// Separator between released fragments
    #[serde(default)]
    pub gap: GapPolicy,

    /// Emit progress every N released items (default: 1)
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            flush_size_threshold: default_flush_size_threshold(),
            flush_count_threshold: default_flush_count_threshold(),
            gap: GapPolicy::default(),
            progress_every: default_progress_every(),
        }
    }
}

/// Pronunciation audio configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Accents fetched per word, in output order (default: UK then US)
    #[serde(default = "default_accents")]
    pub accents: Vec<Accent>,

    /// Sample rate every clip is resampled to (default: 22050 Hz)
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Trim leading and trailing silence from each clip (default: true)
    #[serde(default = "default_true")]
    pub trim_silence: bool,

    /// Level below which audio counts as silence, in dBFS (default: -40.0)
    #[serde(default = "default_silence_threshold_db")]
    pub silence_threshold_db: f32,

    /// Path to the ffmpeg executable (auto-detected if None)
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Whether to search PATH for ffmpeg if no explicit path is set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            accents: default_accents(),
            sample_rate: default_sample_rate(),
            trim_silence: true,
            silence_threshold_db: default_silence_threshold_db(),
            ffmpeg_path: None,
            search_path: true,
        }
    }
}

impl AudioConfig {
    /// Accents to request; an empty selection falls back to US
    pub fn effective_accents(&self) -> Vec<Accent> {
        if self.accents.is_empty() {
            vec![Accent::Us]
        } else {
            self.accents.clone()
        }
    }
}

/// Main configuration for [`VocabDownloader`](crate::VocabDownloader)
///
/// Fields are organized into logical sub-configs:
/// - [`concurrency`](ConcurrencyConfig) - adaptive limit and submission window
/// - [`retry`](RetryConfig) - per-request retry and backoff
/// - [`fetch`](FetchConfig) - endpoints, timeouts, cache, failure policy
/// - [`assembly`](AssemblyConfig) - batching, gaps, progress cadence
/// - [`audio`](AudioConfig) - pronunciation clip processing
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Adaptive concurrency settings
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    /// Retry settings
    #[serde(default)]
    pub retry: RetryConfig,

    /// Endpoint and cache settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Batch assembly settings
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// Audio processing settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Parent directory for run-scoped scratch storage (default: system temp dir)
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: ConcurrencyConfig::default(),
            retry: RetryConfig::default(),
            fetch: FetchConfig::default(),
            assembly: AssemblyConfig::default(),
            audio: AudioConfig::default(),
            temp_dir: default_temp_dir(),
        }
    }
}

impl Config {
    /// Load a configuration from a TOML file and validate it
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> Result<()> {
        let c = &self.concurrency;
        if c.max_concurrency == 0 {
            return Err(Error::config("max_concurrency", "must be at least 1"));
        }
        if c.initial_concurrency == 0 || c.initial_concurrency > c.max_concurrency {
            return Err(Error::config(
                "initial_concurrency",
                format!("must be between 1 and max_concurrency ({})", c.max_concurrency),
            ));
        }
        if c.window_factor == 0 {
            return Err(Error::config("window_factor", "must be at least 1"));
        }
        if c.window_cap == 0 {
            return Err(Error::config("window_cap", "must be at least 1"));
        }
        match &c.recovery {
            RecoveryPolicy::SuccessStreak { threshold } if *threshold == 0 => {
                return Err(Error::config("recovery.threshold", "must be at least 1"));
            }
            RecoveryPolicy::QuietPeriod { period } if period.is_zero() => {
                return Err(Error::config("recovery.period", "must be non-zero"));
            }
            _ => {}
        }

        if self.retry.max_attempts == 0 {
            return Err(Error::config("max_attempts", "must be at least 1"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config("backoff_multiplier", "must be >= 1.0"));
        }

        if self.assembly.flush_count_threshold == 0 {
            return Err(Error::config("flush_count_threshold", "must be at least 1"));
        }
        if self.assembly.progress_every == 0 {
            return Err(Error::config("progress_every", "must be at least 1"));
        }
        match self.assembly.gap {
            GapPolicy::Fixed { seconds } if seconds < 0.0 || !seconds.is_finite() => {
                return Err(Error::config("gap.seconds", "must be a non-negative number"));
            }
            GapPolicy::Rate { multiplier } if multiplier < 0.0 || !multiplier.is_finite() => {
                return Err(Error::config("gap.multiplier", "must be a non-negative number"));
            }
            _ => {}
        }

        if self.audio.sample_rate == 0 {
            return Err(Error::config("sample_rate", "must be non-zero"));
        }
        if reqwest::Url::parse(&self.fetch.base_url).is_err() {
            return Err(Error::config("base_url", "must be an absolute URL"));
        }
        Ok(())
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_window_factor() -> usize {
    2
}

fn default_window_cap() -> usize {
    50
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://dict.youdao.com".to_string()
}

fn default_quiet_period() -> Duration {
    Duration::from_secs(5)
}

fn default_dictionary_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_audio_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_throttle_statuses() -> Vec<u16> {
    vec![403, 429]
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
}

fn default_cache_dir() -> Option<PathBuf> {
    Some(PathBuf::from("cache"))
}

fn default_cache_expiry() -> Duration {
    Duration::from_secs(30 * 24 * 3600) // 30 days
}

fn default_flush_size_threshold() -> u64 {
    60_000
}

fn default_flush_count_threshold() -> usize {
    50
}

fn default_progress_every() -> usize {
    1
}

fn default_accents() -> Vec<Accent> {
    vec![Accent::Uk, Accent::Us]
}

fn default_sample_rate() -> u32 {
    22_050
}

fn default_silence_threshold_db() -> f32 {
    -40.0
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir()
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds, for backoff delays)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
