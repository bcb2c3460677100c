//! Core types for vocab-fetch

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::wordlist::WordRecord;

/// Pronunciation accent; the discriminant is the service's `type` parameter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Accent {
    /// British English (`type=1`)
    Uk = 1,
    /// American English (`type=2`)
    Us = 2,
}

impl Accent {
    /// Value of the `type` query parameter for this accent
    pub fn voice_type(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Accent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Accent::Uk => write!(f, "uk"),
            Accent::Us => write!(f, "us"),
        }
    }
}

/// A remote resource fetched for one item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "accent", rename_all = "snake_case")]
pub enum Resource {
    /// Dictionary lookup (phonetics and translation)
    Dictionary,
    /// Pronunciation clip in the given accent
    Pronunciation(Accent),
}

impl Resource {
    /// Short label used in cache file names and logs
    pub fn label(&self) -> String {
        match self {
            Resource::Dictionary => "dict".to_string(),
            Resource::Pronunciation(accent) => accent.voice_type().to_string(),
        }
    }

    /// Cache file extension for this resource
    pub fn extension(&self) -> &'static str {
        match self {
            Resource::Dictionary => "json",
            Resource::Pronunciation(_) => "mp3",
        }
    }
}

/// One element of the ordered input
///
/// `index` is the position in the input and is unique within a run.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkItem {
    /// Position in the input sequence
    pub index: usize,
    /// Lookup key (the word)
    pub key: String,
    /// Source record, merged with the fetched entry by the dictionary flavor
    pub record: WordRecord,
}

impl WorkItem {
    /// Build work items from records, keyed by their `value` field
    pub fn from_records(records: &[WordRecord]) -> Vec<WorkItem> {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| WorkItem {
                index,
                key: record.value.clone(),
                record: record.clone(),
            })
            .collect()
    }
}

/// Typed dictionary lookup result
///
/// Absent fields leave the corresponding record field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// US phonetic transcription, wrapped in slashes
    pub usphone: Option<String>,
    /// UK phonetic transcription, wrapped in slashes
    pub ukphone: Option<String>,
    /// Translation fragments joined by newlines; None when there were none
    pub translation: Option<String>,
}

/// Decoded payload of a successful fetch
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Dictionary entry
    Entry(DictionaryEntry),
    /// Raw encoded audio clip
    Audio(Vec<u8>),
}

/// Classification of a single fetch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    /// Payload obtained (possibly after retries, possibly from cache)
    Success,
    /// Attempt throttled by the remote service
    RateLimited,
    /// Attempt failed in a retryable way (network, unexpected status, malformed body)
    TransientError,
    /// Retries exhausted
    FatalError,
    /// Run cancelled before the fetch finished
    Cancelled,
}

/// Result of fetching one resource for one item
#[derive(Clone, Debug, PartialEq)]
pub struct FetchOutcome {
    /// Outcome classification
    pub status: StatusClass,
    /// Payload, present only on success
    pub payload: Option<Payload>,
    /// Whether the payload came from the local cache
    pub cached: bool,
    /// Network attempts made (0 for cache hits)
    pub attempts: u32,
    /// Attempts classified [`StatusClass::RateLimited`]
    pub throttled: u32,
    /// Last error, present on failure
    pub error: Option<String>,
}

impl FetchOutcome {
    /// Successful network fetch
    pub fn success(payload: Payload, attempts: u32) -> Self {
        Self {
            status: StatusClass::Success,
            payload: Some(payload),
            cached: false,
            attempts,
            throttled: 0,
            error: None,
        }
    }

    /// Cache hit
    pub fn cached(payload: Payload) -> Self {
        Self {
            status: StatusClass::Success,
            payload: Some(payload),
            cached: true,
            attempts: 0,
            throttled: 0,
            error: None,
        }
    }

    /// Retries exhausted
    pub fn fatal(error: impl Into<String>, attempts: u32) -> Self {
        Self {
            status: StatusClass::FatalError,
            payload: None,
            cached: false,
            attempts,
            throttled: 0,
            error: Some(error.into()),
        }
    }

    /// Fetch abandoned because the run was cancelled
    pub fn cancelled(attempts: u32) -> Self {
        Self {
            status: StatusClass::Cancelled,
            payload: None,
            cached: false,
            attempts,
            throttled: 0,
            error: None,
        }
    }

    /// Record how many attempts were throttled
    #[must_use]
    pub fn with_throttled(mut self, throttled: u32) -> Self {
        self.throttled = throttled;
        self
    }

    /// True when a payload is available
    pub fn is_success(&self) -> bool {
        self.status == StatusClass::Success
    }
}

/// All fetch outcomes for one work item, in requested resource order
#[derive(Clone, Debug)]
pub struct ItemOutcome {
    /// The item these outcomes belong to
    pub item: WorkItem,
    /// One outcome per requested resource
    pub parts: Vec<(Resource, FetchOutcome)>,
}

impl ItemOutcome {
    /// True when any resource exhausted its retries
    pub fn is_failed(&self) -> bool {
        self.parts
            .iter()
            .any(|(_, outcome)| outcome.status == StatusClass::FatalError)
    }

    /// First error recorded across the item's parts
    pub fn first_error(&self) -> Option<&str> {
        self.parts
            .iter()
            .find_map(|(_, outcome)| outcome.error.as_deref())
    }

    /// Successful payloads in resource order
    pub fn payloads(&self) -> impl Iterator<Item = (&Resource, &Payload)> {
        self.parts
            .iter()
            .filter_map(|(resource, outcome)| outcome.payload.as_ref().map(|p| (resource, p)))
    }
}

/// Lifecycle state of a pipeline run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// Created but not started
    Idle,
    /// Submitting and assembling
    Running,
    /// Artifact produced
    Completed,
    /// Aborted by a fatal item or a sink error
    Failed,
    /// Stopped by the cancellation token
    Cancelled,
}

/// An item absorbed under the skip failure policy
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    /// Position in the input
    pub index: usize,
    /// Item key
    pub key: String,
    /// Last error observed
    pub error: String,
}

/// Summary of a completed run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSummary {
    /// Final combined artifact
    pub artifact: PathBuf,
    /// Items in the input
    pub total: usize,
    /// Items released in order
    pub processed: usize,
    /// Batches flushed to the sink
    pub batches: usize,
    /// Concurrency limit when the run ended
    pub final_limit: usize,
    /// Items that failed and were skipped
    pub failed: Vec<FailedItem>,
}

/// How a run ended when it did not fail
#[derive(Clone, Debug)]
pub enum RunOutcome {
    /// Every item was released and the artifact written
    Completed(RunSummary),
    /// The run was cancelled; no artifact was produced
    Cancelled {
        /// Items released before cancellation
        processed: usize,
        /// Items in the input
        total: usize,
    },
}

impl RunOutcome {
    /// Summary of a completed run, if any
    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Completed(summary) => Some(summary),
            RunOutcome::Cancelled { .. } => None,
        }
    }
}

/// Event emitted during a pipeline run
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run entered the Running state
    RunStarted {
        /// Run label (word list name or output file)
        label: String,
        /// Items in the input
        total: usize,
        /// Concurrency limit the run starts with
        concurrency: usize,
    },

    /// Items released so far
    Progress {
        /// Items released in order
        processed: usize,
        /// Items in the input
        total: usize,
        /// Run label
        label: String,
    },

    /// The adaptive concurrency limit changed
    ConcurrencyChanged {
        /// Limit before the change
        previous: usize,
        /// Limit after the change
        current: usize,
    },

    /// An item exhausted its retries
    ItemFailed {
        /// Position in the input
        index: usize,
        /// Item key
        key: String,
        /// Last error observed
        error: String,
    },

    /// A batch was persisted to scratch storage
    BatchFlushed {
        /// Batch sequence number
        seq: usize,
        /// Items in the batch
        items: usize,
        /// Accumulated size (milliseconds for audio)
        size: u64,
    },

    /// Run finished and the artifact was written
    RunCompleted {
        /// Final artifact
        artifact: PathBuf,
        /// Items released
        processed: usize,
        /// Items skipped after failing
        failed: usize,
    },

    /// Run failed; no artifact was produced
    RunFailed {
        /// Error message
        error: String,
    },

    /// Run was cancelled
    RunCancelled {
        /// Items released before cancellation
        processed: usize,
        /// Items in the input
        total: usize,
    },
}
