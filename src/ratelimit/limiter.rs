use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Quota as reported by the collaborator with a page response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub limit: Option<u32>,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("quota resets in {wait:?}, longer than the allowed {max:?}")]
    WaitTooLong { wait: Duration, max: Duration },
    #[error("cancelled while waiting for the quota window")]
    Cancelled,
}

#[derive(Debug, Default)]
struct QuotaState {
    /// `None` until the collaborator has reported a quota in this run.
    remaining: Option<u32>,
    reset_at: Option<DateTime<Utc>>,
}

/// Outbound request budget for one run.
///
/// Tracks the remaining quota and window reset reported by the API. When the
/// budget is spent, [`RateLimiter::acquire`] sleeps until the reported reset
/// instead of retrying; only the calling task waits, and only until `cancel`
/// fires.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<QuotaState>,
    max_wait: Duration,
}

impl RateLimiter {
    pub fn new(max_wait: Duration) -> Self {
        RateLimiter {
            state: Mutex::new(QuotaState::default()),
            max_wait,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QuotaState> {
        // quota state stays consistent across a panicking holder
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until `cost` more calls fit in the current window, then reserve them.
    pub async fn acquire(
        &self,
        cost: u32,
        cancel: &CancellationToken,
    ) -> Result<(), RateLimitError> {
        loop {
            let (wait, waited_for) = {
                let mut state = self.lock();
                match (state.remaining, state.reset_at) {
                    (None, _) => return Ok(()),
                    (Some(remaining), _) if remaining >= cost => {
                        state.remaining = Some(remaining - cost);
                        return Ok(());
                    }
                    (Some(_), Some(reset_at)) => {
                        let now = Utc::now();
                        if reset_at <= now {
                            // window rolled over; the next response re-reports quota
                            *state = QuotaState::default();
                            return Ok(());
                        }
                        ((reset_at - now).to_std().unwrap_or(Duration::ZERO), reset_at)
                    }
                    (Some(_), None) => {
                        *state = QuotaState::default();
                        return Ok(());
                    }
                }
            };

            if wait > self.max_wait {
                return Err(RateLimitError::WaitTooLong {
                    wait,
                    max: self.max_wait,
                });
            }

            info!(wait_secs = wait.as_secs(), cost, "quota spent, waiting for window reset");
            tokio::select! {
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }

            // the reported reset has passed unless a newer report arrived meanwhile
            let mut state = self.lock();
            if state.reset_at == Some(waited_for) {
                *state = QuotaState::default();
            }
        }
    }

    /// Record the quota reported with a response. The API is authoritative.
    pub fn observe(&self, quota: &QuotaSnapshot) {
        let mut state = self.lock();
        state.remaining = Some(quota.remaining);
        state.reset_at = Some(quota.reset_at);
        debug!(remaining = quota.remaining, reset_at = %quota.reset_at, "quota observed");
    }

    /// The API refused a call for quota; block acquisitions until `reset_at`.
    pub fn exhausted(&self, reset_at: DateTime<Utc>) {
        let mut state = self.lock();
        state.remaining = Some(0);
        state.reset_at = Some(reset_at);
    }

    pub fn remaining(&self) -> Option<u32> {
        self.lock().remaining
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.lock().reset_at
    }

    /// Forget everything learned about the quota.
    pub fn reset(&self) {
        *self.lock() = QuotaState::default();
    }
}
