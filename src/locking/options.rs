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

use crate::error::{MemlockError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shortest lock when the store's native TTL decides liveness. Store TTLs have
/// whole-second granularity.
pub const MIN_LOCK_DURATION_STORE_TTL: Duration = Duration::from_secs(1);

/// Shortest lock when the expiry encoded in the token decides liveness.
pub const MIN_LOCK_DURATION_SELF_EXPIRE: Duration = Duration::from_millis(10);

/// Pause between acquisition attempts while waiting for a busy lock.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Shortest accepted pause between attempts; waiting never busy-loops.
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Value written by `release`; it encodes a zero expiry so any reader treats
/// the key as free.
pub const RELEASED_SENTINEL: &[u8] = b"0";

/// TTL of the released sentinel.
pub const RELEASED_TTL_SECS: u32 = 1;

/// Behaviour switches fixed for the lifetime of a lock handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockOptions {
    /// Report ownership failures (`LockAlreadyAcquired`, `NotAcquired`,
    /// `LostLock`) as `Ok(false)` instead of errors.
    pub catch_exceptions: bool,
    /// Decide staleness from the expiry encoded in the token instead of
    /// trusting the store's TTL.
    pub self_expire_sync: bool,
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catch_exceptions(mut self, enabled: bool) -> Self {
        self.catch_exceptions = enabled;
        self
    }

    pub fn with_self_expire_sync(mut self, enabled: bool) -> Self {
        self.self_expire_sync = enabled;
        self
    }

    pub fn min_lock_duration(&self) -> Duration {
        if self.self_expire_sync {
            MIN_LOCK_DURATION_SELF_EXPIRE
        } else {
            MIN_LOCK_DURATION_STORE_TTL
        }
    }

    pub fn validate_lock_duration(&self, lock_duration: Duration) -> Result<()> {
        let minimum = self.min_lock_duration();
        if lock_duration < minimum {
            return Err(MemlockError::InvalidArgument(format!(
                "lock duration {:.3}s is below the minimum of {:.3}s",
                lock_duration.as_secs_f64(),
                minimum.as_secs_f64()
            )));
        }
        Ok(())
    }
}

/// Store TTL for a lock held for `lock_duration`: rounded up to whole seconds
/// so the store never expires the key before the token's own expiry.
pub fn store_ttl_secs(lock_duration: Duration) -> u32 {
    let mut secs = lock_duration.as_secs();
    if lock_duration.subsec_nanos() > 0 {
        secs += 1;
    }
    u32::try_from(secs.max(1)).unwrap_or(u32::MAX)
}

/// Converts caller supplied seconds into a `Duration`.
pub fn seconds(value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        MemlockError::InvalidArgument(format!(
            "'{value}' is not a valid number of seconds; expected a finite value >= 0"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_depends_on_self_expire_sync() {
        let store_ttl = LockOptions::new();
        let self_expire = LockOptions::new().with_self_expire_sync(true);

        assert_eq!(store_ttl.min_lock_duration(), Duration::from_secs(1));
        assert_eq!(self_expire.min_lock_duration(), Duration::from_millis(10));

        assert!(
            store_ttl
                .validate_lock_duration(Duration::from_millis(900))
                .is_err()
        );
        assert!(
            self_expire
                .validate_lock_duration(Duration::from_millis(900))
                .is_ok()
        );
        assert!(
            self_expire
                .validate_lock_duration(Duration::from_millis(9))
                .is_err()
        );
    }

    #[test]
    fn store_ttl_rounds_up_to_whole_seconds() {
        assert_eq!(store_ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(store_ttl_secs(Duration::from_secs(1)), 1);
        assert_eq!(store_ttl_secs(Duration::from_millis(1_001)), 2);
        assert_eq!(store_ttl_secs(Duration::from_secs(30)), 30);
        assert_eq!(store_ttl_secs(Duration::ZERO), 1);
    }

    #[test]
    fn seconds_rejects_negative_and_non_finite() {
        assert_eq!(seconds(1.5).unwrap(), Duration::from_millis(1_500));
        assert_eq!(seconds(0.0).unwrap(), Duration::ZERO);

        for bad in [-0.5, f64::NAN, f64::INFINITY] {
            match seconds(bad) {
                Err(MemlockError::InvalidArgument(msg)) => assert!(msg.contains("seconds")),
                other => panic!("Expected invalid argument for {bad}, got {other:?}"),
            }
        }
    }
}
