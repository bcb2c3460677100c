//! Remote fetching with retry, adaptive admission and caching
//!
//! [`FetchClient`] issues one HTTP request per (word, resource) pair. Every
//! attempt holds a [`Permit`](crate::concurrency::Permit) from the shared
//! [`ConcurrencyManager`] and reports its result back to it, so throttling
//! anywhere in the run narrows admission everywhere.

pub mod cache;
pub mod dictionary;

pub use cache::ResponseCache;

use crate::concurrency::ConcurrencyManager;
use crate::config::{Config, FetchConfig, RetryConfig};
use crate::error::{Error, FetchError, Result};
use crate::retry::fetch_with_retry;
use crate::types::{FetchOutcome, ItemOutcome, Payload, Resource, StatusClass, WorkItem};
use reqwest::Url;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Abstraction over per-item fetching, enabling testability
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch every requested resource for `item`
    ///
    /// Must not fail: errors are reported through the returned outcomes.
    async fn fetch_item(&self, item: WorkItem, cancel: &CancellationToken) -> ItemOutcome;
}

/// Production [`Fetcher`] backed by the dictionary web service
pub struct FetchClient {
    http: reqwest::Client,
    config: FetchConfig,
    retry: RetryConfig,
    limiter: Arc<ConcurrencyManager>,
    cache: Option<ResponseCache>,
    resources: Vec<Resource>,
}

impl FetchClient {
    /// Build a client fetching `resources` for each item
    pub fn new(
        config: &Config,
        resources: Vec<Resource>,
        limiter: Arc<ConcurrencyManager>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.fetch.user_agent.clone())
            .build()?;
        Url::parse(&config.fetch.base_url)
            .map_err(|e| Error::config("base_url", e.to_string()))?;

        let cache = config
            .fetch
            .cache_dir
            .as_ref()
            .map(|dir| ResponseCache::new(dir.clone(), config.fetch.cache_expiry));

        Ok(Self {
            http,
            config: config.fetch.clone(),
            retry: config.retry.clone(),
            limiter,
            cache,
            resources,
        })
    }

    /// Resources requested per item, in output order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// Shared admission limiter
    pub fn limiter(&self) -> &Arc<ConcurrencyManager> {
        &self.limiter
    }

    /// Fetch one resource for one key
    ///
    /// A fresh cache entry short-circuits without taking a permit or touching
    /// the limiter. Otherwise each attempt is admitted separately and
    /// reported as success or error.
    pub async fn fetch(&self, key: &str, resource: Resource) -> FetchOutcome {
        if let Some(cache) = &self.cache
            && let Some(data) = cache.load(key, &resource).await
        {
            match decode_payload(resource, &data) {
                Ok(payload) => {
                    tracing::debug!(key, resource = %resource.label(), "cache hit");
                    return FetchOutcome::cached(payload);
                }
                Err(e) => {
                    tracing::debug!(key, error = %e, "ignoring undecodable cache entry");
                }
            }
        }

        let url = match self.url_for(key, resource) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::fatal(e.to_string(), 0),
        };
        let timeout = self.timeout_for(resource);
        let throttled = AtomicU32::new(0);

        let result = fetch_with_retry(&self.retry, key, |attempt| {
            let url = url.clone();
            let throttled = &throttled;
            async move {
                let _permit = self.limiter.acquire().await;
                tracing::trace!(key, attempt, %url, "requesting");
                let fetched = self.request(url, timeout).await.and_then(|body| {
                    let payload = decode_payload(resource, &body)?;
                    Ok((payload, body))
                });
                match &fetched {
                    Ok(_) => self.limiter.report_success(),
                    Err(e) => {
                        if e.status_class() == StatusClass::RateLimited {
                            throttled.fetch_add(1, Ordering::Relaxed);
                            tracing::debug!(key, attempt, error = %e, "throttled");
                        } else {
                            tracing::debug!(key, attempt, error = %e, "attempt failed");
                        }
                        self.limiter.report_error();
                    }
                }
                fetched
            }
        })
        .await;
        let throttled = throttled.into_inner();

        let outcome = match result {
            Ok(((payload, body), attempts)) => {
                if let Some(cache) = &self.cache
                    && let Err(e) = cache.store(key, &resource, &body).await
                {
                    tracing::warn!(key, error = %e, "failed to write cache entry");
                }
                FetchOutcome::success(payload, attempts)
            }
            Err(FetchError::RetriesExhausted {
                attempts,
                last_error,
                ..
            }) => FetchOutcome::fatal(last_error, attempts),
            Err(e) => FetchOutcome::fatal(e.to_string(), self.retry.max_attempts),
        };
        outcome.with_throttled(throttled)
    }

    async fn request(&self, url: Url, timeout: Duration) -> std::result::Result<Vec<u8>, FetchError> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| FetchError::TransientNetwork(e.to_string()))?;

        let status = response.status();
        if self.config.throttle_statuses.contains(&status.as_u16()) {
            return Err(FetchError::RateLimited {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::TransientNetwork(e.to_string()))?;
        Ok(body.to_vec())
    }

    fn url_for(&self, key: &str, resource: Resource) -> Result<Url> {
        let base = self.config.base_url.trim_end_matches('/');
        let endpoint = match resource {
            Resource::Dictionary => "jsonapi",
            Resource::Pronunciation(_) => "dictvoice",
        };
        let mut url = Url::parse(&format!("{base}/{endpoint}"))
            .map_err(|e| Error::config("base_url", e.to_string()))?;
        {
            let mut query = url.query_pairs_mut();
            match resource {
                Resource::Dictionary => {
                    query
                        .append_pair("q", key)
                        .append_pair("dicts", dictionary::DICTS_PARAM);
                }
                Resource::Pronunciation(accent) => {
                    query
                        .append_pair("audio", key)
                        .append_pair("type", &accent.voice_type().to_string());
                }
            }
        }
        Ok(url)
    }

    fn timeout_for(&self, resource: Resource) -> Duration {
        match resource {
            Resource::Dictionary => self.config.dictionary_timeout,
            Resource::Pronunciation(_) => self.config.audio_timeout,
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for FetchClient {
    async fn fetch_item(&self, item: WorkItem, cancel: &CancellationToken) -> ItemOutcome {
        if item.key.trim().is_empty() {
            tracing::debug!(index = item.index, "skipping item without a key");
            return ItemOutcome {
                item,
                parts: Vec::new(),
            };
        }

        let fetches = self
            .resources
            .iter()
            .map(|resource| self.fetch(&item.key, *resource));

        let outcomes = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.resources.iter().map(|_| FetchOutcome::cancelled(0)).collect()
            }
            outcomes = futures::future::join_all(fetches) => outcomes,
        };

        ItemOutcome {
            parts: self.resources.iter().copied().zip(outcomes).collect(),
            item,
        }
    }
}

/// Decode a response body into the payload schema of `resource`
fn decode_payload(resource: Resource, body: &[u8]) -> std::result::Result<Payload, FetchError> {
    match resource {
        Resource::Dictionary => dictionary::parse_entry(body).map(Payload::Entry),
        Resource::Pronunciation(_) if body.is_empty() => {
            Err(FetchError::MalformedResponse("empty audio body".to_string()))
        }
        Resource::Pronunciation(_) => Ok(Payload::Audio(body.to_vec())),
    }
}
