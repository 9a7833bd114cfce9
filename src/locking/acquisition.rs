// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::locking::options::{DEFAULT_RETRY_INTERVAL, MIN_RETRY_INTERVAL};
use crate::locking::wait_observer::LockWaitObserver;
use std::time::{Duration, Instant};

/// Indicates whether a lock request may block waiting for contention to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    Blocking,
    NonBlocking,
}

impl AcquireMode {
    pub fn is_blocking(self) -> bool {
        matches!(self, AcquireMode::Blocking)
    }

    pub fn is_non_blocking(self) -> bool {
        matches!(self, AcquireMode::NonBlocking)
    }
}

/// Tracks elapsed and remaining time for a wait budget.
#[derive(Debug, Clone)]
pub struct WaitBudget {
    limit: Duration,
    started_at: Instant,
}

impl WaitBudget {
    pub fn new(limit: Duration) -> Self {
        Self::with_start(limit, Instant::now())
    }

    pub fn with_start(limit: Duration, started_at: Instant) -> Self {
        Self { limit, started_at }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.limit
    }

    /// Retry interval capped to what is left of the budget; `None` once the
    /// budget is spent.
    pub fn next_sleep(&self, retry_interval: Duration) -> Option<Duration> {
        let remaining = self.remaining();
        if remaining.is_zero() {
            return None;
        }
        Some(retry_interval.min(remaining))
    }
}

/// Carries the parameters of a single `acquire` call.
#[derive(Clone)]
pub struct AcquireRequest<'a> {
    lock_duration: Duration,
    wait: Duration,
    retry_interval: Duration,
    observer: Option<&'a dyn LockWaitObserver>,
}

impl<'a> AcquireRequest<'a> {
    /// Single non-blocking attempt holding the lock for `lock_duration`.
    pub fn new(lock_duration: Duration) -> Self {
        Self {
            lock_duration,
            wait: Duration::ZERO,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            observer: None,
        }
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Sets the pause between attempts, raised to at least 1 ms.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval.max(MIN_RETRY_INTERVAL);
        self
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn LockWaitObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn observer(&self) -> Option<&'a dyn LockWaitObserver> {
        self.observer
    }

    pub fn mode(&self) -> AcquireMode {
        if self.wait.is_zero() {
            AcquireMode::NonBlocking
        } else {
            AcquireMode::Blocking
        }
    }
}

/// Per-call bookkeeping for the acquisition loop: budget, retry count and
/// observer notifications.
pub(crate) struct AcquireProgress<'r, 'a> {
    key: &'r str,
    request: &'r AcquireRequest<'a>,
    budget: WaitBudget,
    retries: usize,
    wait_started: bool,
    raced: bool,
}

impl<'r, 'a> AcquireProgress<'r, 'a> {
    pub(crate) fn start(key: &'r str, request: &'r AcquireRequest<'a>) -> Self {
        Self {
            key,
            request,
            budget: WaitBudget::new(request.wait()),
            retries: 0,
            wait_started: false,
            raced: false,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.budget.elapsed()
    }

    pub(crate) fn retries(&self) -> usize {
        self.retries
    }

    /// Returns how long to pause before the next attempt, or `None` when the
    /// caller should give up.
    pub(crate) fn next_pause(&mut self) -> Option<Duration> {
        if self.request.mode().is_non_blocking() {
            return None;
        }

        if !self.wait_started {
            self.wait_started = true;
            if let Some(observer) = self.request.observer() {
                observer.on_wait_start(self.key, self.budget.limit());
            }
        }

        let pause = self.budget.next_sleep(self.request.retry_interval())?;
        self.raced = false;
        self.retries = self.retries.saturating_add(1);
        if let Some(observer) = self.request.observer() {
            observer.on_retry(
                self.key,
                self.retries,
                self.budget.elapsed(),
                self.budget.remaining(),
            );
        }
        Some(pause)
    }

    /// Whether an attempt cut short by a concurrent writer may be repeated
    /// without pausing. Only one such retry is allowed in a row; the next race
    /// goes through the regular pause and budget check.
    pub(crate) fn retry_immediately(&mut self) -> bool {
        !std::mem::replace(&mut self.raced, true)
    }

    pub(crate) fn is_spent(&self) -> bool {
        self.request.mode().is_non_blocking() || self.budget.is_expired()
    }

    pub(crate) fn notify_stale_holder(&self, holder_expires_at_ms: u64) {
        if let Some(observer) = self.request.observer() {
            observer.on_stale_holder(self.key, holder_expires_at_ms);
        }
    }

    pub(crate) fn notify_acquired(&self) {
        if let Some(observer) = self.request.observer() {
            observer.on_acquired(self.key, self.budget.elapsed());
        }
    }

    pub(crate) fn notify_timeout(&self) {
        if let Some(observer) = self.request.observer() {
            observer.on_timeout(self.key, self.budget.elapsed());
        }
    }
}
