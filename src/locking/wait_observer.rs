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

//! Observer interfaces for lock wait instrumentation.
//!
//! Observers let callers surface contention (retries, stale holders, timeouts)
//! without duplicating the acquisition loop.

use std::time::Duration;

/// Observer hooks for lock wait events.
pub trait LockWaitObserver: Send + Sync {
    fn on_wait_start(&self, _key: &str, _wait: Duration) {}

    fn on_retry(&self, _key: &str, _attempt: usize, _elapsed: Duration, _remaining: Duration) {}

    /// A holder whose token is stale was found; a takeover will be attempted.
    fn on_stale_holder(&self, _key: &str, _holder_expires_at_ms: u64) {}

    fn on_acquired(&self, _key: &str, _waited: Duration) {}

    fn on_timeout(&self, _key: &str, _waited: Duration) {}
}

/// Observer implementation that performs no work.
#[derive(Debug, Default)]
pub struct NoopLockWaitObserver;

impl LockWaitObserver for NoopLockWaitObserver {}
