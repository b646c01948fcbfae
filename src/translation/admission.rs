/*!
 * Admission control for provider requests.
 *
 * A request is admitted when the concurrency cap, the requests-per-window
 * quota and the tokens-per-window quota all have room for it. Usage is
 * tracked over a sliding window: every completed request leaves an entry
 * stamped with its completion time, and entries older than the window are
 * pruned lazily on the next check.
 *
 * Queued callers poll at a fixed interval instead of being woken, so the
 * only shared state is the one mutex-guarded `AdmissionInner`.
 */

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::app_config::RateLimitConfig;
use crate::errors::AdmissionError;

/// Quotas enforced by an `AdmissionController`
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Requests admitted per window
    pub requests_per_window: u32,
    /// Tokens admitted per window
    pub tokens_per_window: u64,
    /// Maximum requests in flight, unbounded when `None`
    pub max_concurrent: Option<usize>,
    /// Length of the sliding window
    pub window: Duration,
    /// Delay between two admission checks of a queued request
    pub poll_interval: Duration,
}

impl From<&RateLimitConfig> for AdmissionConfig {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            requests_per_window: config.requests_per_minute,
            tokens_per_window: config.tokens_per_minute,
            max_concurrent: config.max_concurrent_requests,
            window: config.window(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Usage of one completed request
#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    completed_at: Instant,
    tokens: u64,
}

#[derive(Debug, Default)]
struct AdmissionInner {
    in_flight: usize,
    window_requests: u32,
    window_tokens: u64,
    completed: VecDeque<WindowEntry>,
    waiting_notice: bool,
}

impl AdmissionInner {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(entry) = self.completed.front() {
            if now.saturating_duration_since(entry.completed_at) <= window {
                break;
            }
            self.window_tokens = self.window_tokens.saturating_sub(entry.tokens);
            self.window_requests = self.window_requests.saturating_sub(1);
            self.completed.pop_front();
        }
    }
}

/// Point-in-time view of the admission counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionState {
    pub in_flight: usize,
    pub window_request_count: u32,
    pub window_token_sum: u64,
    pub waiting_notice_shown: bool,
}

/// Sliding-window quota and concurrency gate shared by every file task
#[derive(Debug, Clone)]
pub struct AdmissionController {
    config: Arc<AdmissionConfig>,
    inner: Arc<Mutex<AdmissionInner>>,
}

impl AdmissionController {
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            config: Arc::new(config),
            inner: Arc::new(Mutex::new(AdmissionInner::default())),
        }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Wait until a request costing `cost` tokens can be admitted.
    ///
    /// Fails immediately when the cost alone exceeds the token quota, such a
    /// request could never be admitted.
    pub async fn acquire(&self, request_id: &str, cost: u64) -> Result<Permit, AdmissionError> {
        if cost > self.config.tokens_per_window {
            return Err(AdmissionError::ExceedsQuota {
                cost,
                quota: self.config.tokens_per_window,
            });
        }

        let mut queued = false;
        loop {
            if self.try_start(cost) {
                debug!("{}: admitted with {} reserved tokens", request_id, cost);
                return Ok(Permit {
                    controller: self.clone(),
                    reserved: cost,
                    released: false,
                });
            }
            if !queued {
                queued = true;
                info!("{}: in queue", request_id);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Return a permit, recording `actual_cost` tokens in the window
    pub fn release(&self, permit: Permit, actual_cost: u64) {
        permit.release(actual_cost);
    }

    /// Current counters, after pruning expired entries
    pub fn snapshot(&self) -> AdmissionState {
        let mut inner = self.inner.lock();
        inner.prune(Instant::now(), self.config.window);
        AdmissionState {
            in_flight: inner.in_flight,
            window_request_count: inner.window_requests,
            window_token_sum: inner.window_tokens,
            waiting_notice_shown: inner.waiting_notice,
        }
    }

    fn try_start(&self, cost: u64) -> bool {
        let now = Instant::now();
        let wait_notice = {
            let mut inner = self.inner.lock();
            inner.prune(now, self.config.window);

            let has_slot = self
                .config
                .max_concurrent
                .is_none_or(|cap| inner.in_flight < cap);
            if has_slot
                && inner.window_requests < self.config.requests_per_window
                && inner.window_tokens + cost <= self.config.tokens_per_window
            {
                inner.in_flight += 1;
                inner.window_requests += 1;
                inner.window_tokens += cost;
                inner.waiting_notice = false;
                return true;
            }

            if inner.in_flight == 0 && !inner.waiting_notice {
                inner.waiting_notice = true;
                inner.completed.front().map(|oldest| {
                    (oldest.completed_at + self.config.window).saturating_duration_since(now)
                })
            } else {
                None
            }
        };

        if let Some(wait) = wait_notice {
            warn!("Waiting {} seconds for rate limits", wait.as_secs().max(1));
        }
        false
    }

    fn complete(&self, reserved: u64, actual: u64) {
        let mut inner = self.inner.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
        inner.window_tokens = inner.window_tokens.saturating_sub(reserved) + actual;
        inner.completed.push_back(WindowEntry {
            completed_at: Instant::now(),
            tokens: actual,
        });
        debug!("Completed {} tokens", actual);
    }
}

/// Admission granted to one request.
///
/// Dropping a permit without releasing it records the reserved cost, so a
/// cancelled request still frees its slot.
#[must_use = "a permit holds an admission slot until released"]
#[derive(Debug)]
pub struct Permit {
    controller: AdmissionController,
    reserved: u64,
    released: bool,
}

impl Permit {
    /// Tokens reserved at admission
    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    /// Free the slot, recording `actual_cost` tokens in the window
    pub fn release(mut self, actual_cost: u64) {
        self.released = true;
        self.controller.complete(self.reserved, actual_cost);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.released {
            self.controller.complete(self.reserved, self.reserved);
        }
    }
}

/// Retries shared by every request of a run, never replenished
#[derive(Debug)]
pub struct RetryBudget {
    remaining: AtomicUsize,
}

impl RetryBudget {
    pub fn new(total: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(total),
        }
    }

    /// Take one retry from the budget, `false` once it is exhausted
    pub fn try_consume(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::SeqCst)
    }
}
