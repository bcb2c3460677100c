//! Adaptive concurrency limiting (AIMD)
//!
//! The [`ConcurrencyManager`] bounds the number of fetch attempts in flight
//! across a run. Every failed attempt halves the limit; the limit grows back
//! according to the configured [`RecoveryPolicy`]:
//!
//! - `SuccessStreak`: one extra permit per `threshold` consecutive successes
//! - `QuietPeriod`: `limit * 1.5 + 1` once `period` has passed without an error
//!   or a change
//!
//! The limit always stays within `[1, max_limit]`. Shrinking never revokes
//! permits already granted; it only blocks new admissions until the in-flight
//! count drops below the new limit.

use crate::config::{ConcurrencyConfig, RecoveryPolicy};
use crate::types::Event;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::{Notify, broadcast};

/// Mutable limiter state, guarded by a single mutex
#[derive(Clone, Debug)]
pub struct ConcurrencyState {
    /// Current permit limit, in `[1, max_limit]`
    pub current_limit: usize,
    /// Upper bound for the limit
    pub max_limit: usize,
    /// Consecutive successes since the last error or increase
    pub success_streak: u32,
    /// Permits currently held
    pub in_flight: usize,
    /// When the limit last changed or an attempt last failed
    pub last_change: Instant,
}

/// Shared adaptive limiter for one run
pub struct ConcurrencyManager {
    state: Mutex<ConcurrencyState>,
    policy: RecoveryPolicy,
    released: Notify,
    event_tx: Option<broadcast::Sender<Event>>,
}

impl std::fmt::Debug for ConcurrencyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyManager")
            .field("state", &*self.lock())
            .field("policy", &self.policy)
            .finish()
    }
}

impl ConcurrencyManager {
    /// Create a limiter starting at `initial_concurrency`
    ///
    /// Out-of-range values are clamped so the bounds hold even for an
    /// unvalidated config.
    #[must_use]
    pub fn new(config: &ConcurrencyConfig) -> Self {
        let max_limit = config.max_concurrency.max(1);
        let current_limit = config.initial_concurrency.clamp(1, max_limit);
        Self {
            state: Mutex::new(ConcurrencyState {
                current_limit,
                max_limit,
                success_streak: 0,
                in_flight: 0,
                last_change: Instant::now(),
            }),
            policy: config.recovery.clone(),
            released: Notify::new(),
            event_tx: None,
        }
    }

    /// Emit [`Event::ConcurrencyChanged`] on the given channel
    #[must_use]
    pub fn with_events(mut self, event_tx: broadcast::Sender<Event>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    fn lock(&self) -> MutexGuard<'_, ConcurrencyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current permit limit
    pub fn current_limit(&self) -> usize {
        self.lock().current_limit
    }

    /// Snapshot of the whole state
    pub fn snapshot(&self) -> ConcurrencyState {
        self.lock().clone()
    }

    /// Record a successful attempt
    pub fn report_success(&self) {
        let change = {
            let mut state = self.lock();
            state.success_streak = state.success_streak.saturating_add(1);
            match self.policy {
                RecoveryPolicy::SuccessStreak { threshold }
                    if state.success_streak >= threshold
                        && state.current_limit < state.max_limit =>
                {
                    let previous = state.current_limit;
                    state.current_limit += 1;
                    state.success_streak = 0;
                    state.last_change = Instant::now();
                    Some((previous, state.current_limit))
                }
                _ => None,
            }
        };
        if let Some((previous, current)) = change {
            self.limit_changed(previous, current);
        }
    }

    /// Record a failed or throttled attempt
    pub fn report_error(&self) {
        let change = {
            let mut state = self.lock();
            state.success_streak = 0;
            let previous = state.current_limit;
            state.current_limit = (previous / 2).max(1);
            // Restarts the quiet period even when already at the floor
            state.last_change = Instant::now();
            if state.current_limit != previous {
                Some((previous, state.current_limit))
            } else {
                None
            }
        };
        if let Some((previous, current)) = change {
            self.limit_changed(previous, current);
        }
    }

    /// Apply quiet-period recovery if it is due
    ///
    /// No-op under the success-streak policy.
    pub fn try_recover(&self) {
        self.try_recover_at(Instant::now());
    }

    /// [`try_recover`](Self::try_recover) against an explicit clock reading
    pub fn try_recover_at(&self, now: Instant) {
        let RecoveryPolicy::QuietPeriod { period } = self.policy else {
            return;
        };
        let change = {
            let mut state = self.lock();
            let quiet = now.saturating_duration_since(state.last_change) >= period;
            if quiet && state.current_limit < state.max_limit {
                let previous = state.current_limit;
                state.current_limit = (previous * 3 / 2 + 1).min(state.max_limit);
                state.last_change = now;
                Some((previous, state.current_limit))
            } else {
                None
            }
        };
        if let Some((previous, current)) = change {
            self.limit_changed(previous, current);
        }
    }

    /// Wait until `in_flight < current_limit`, then take a permit
    pub async fn acquire(self: &Arc<Self>) -> Permit {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release between check and await is not lost
            notified.as_mut().enable();

            if let Some(permit) = self.try_acquire() {
                return permit;
            }
            notified.await;
        }
    }

    /// Take a permit if one is available right now
    pub fn try_acquire(self: &Arc<Self>) -> Option<Permit> {
        let mut state = self.lock();
        if state.in_flight < state.current_limit {
            state.in_flight += 1;
            Some(Permit {
                manager: Arc::clone(self),
            })
        } else {
            None
        }
    }

    fn limit_changed(&self, previous: usize, current: usize) {
        if current < previous {
            tracing::warn!(previous, current, "reducing concurrency");
        } else {
            tracing::info!(previous, current, "raising concurrency");
            self.released.notify_waiters();
        }
        if let Some(tx) = &self.event_tx {
            // No subscribers is fine
            let _ = tx.send(Event::ConcurrencyChanged { previous, current });
        }
    }
}

/// Admission to issue one fetch attempt; released on drop
#[must_use = "the permit is released as soon as it is dropped"]
pub struct Permit {
    manager: Arc<ConcurrencyManager>,
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit").finish_non_exhaustive()
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        {
            let mut state = self.manager.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
        }
        self.manager.released.notify_waiters();
    }
}
