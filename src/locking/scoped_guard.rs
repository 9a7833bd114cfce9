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

use crate::error::Result;
use crate::locking::handle::CasLock;
use log::warn;
use std::time::Duration;

/// RAII guard that releases an acquired lock when dropped.
pub struct ScopedLockGuard<'a> {
    lock: &'a mut CasLock,
    released: bool,
}

impl<'a> ScopedLockGuard<'a> {
    pub(crate) fn new(lock: &'a mut CasLock) -> Self {
        Self {
            lock,
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        self.lock.key()
    }

    pub fn expires_at_ms(&self) -> Option<u64> {
        self.lock.expires_at_ms()
    }

    pub fn update(&mut self, lock_duration: Duration) -> Result<bool> {
        self.lock.update(lock_duration)
    }

    pub fn is_locked(&mut self) -> Result<bool> {
        self.lock.is_locked()
    }

    /// Releases now, reporting a lock lost in the meantime.
    pub fn release(mut self) -> Result<bool> {
        self.released = true;
        self.lock.release()
    }
}

impl Drop for ScopedLockGuard<'_> {
    fn drop(&mut self) {
        if self.released || !self.lock.holds_version() {
            return;
        }

        match self.lock.release() {
            Ok(true) => {}
            Ok(false) => warn!(
                "Lock {} was lost before the guard released it",
                self.lock.key()
            ),
            Err(err) => warn!("Failed to release lock {}: {err}", self.lock.key()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemlockError;
    use crate::locking::LockOptions;
    use crate::store::InMemoryStore;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::sync::Arc;

    fn lock_on(store: &Arc<InMemoryStore>) -> CasLock {
        CasLock::new(store.clone(), "guarded", LockOptions::new()).unwrap()
    }

    #[test]
    fn guard_release_allows_reacquire() {
        let store = Arc::new(InMemoryStore::new());
        let mut first = lock_on(&store);
        let mut second = lock_on(&store);

        {
            let mut guard = first
                .acquire_scoped(Duration::from_secs(2), Duration::ZERO)
                .unwrap()
                .unwrap();
            assert_eq!(guard.key(), "guarded");
            assert!(guard.is_locked().unwrap());
        }

        assert!(!first.is_acquired());
        assert!(second.acquire(Duration::from_secs(2), Duration::ZERO).unwrap());
    }

    #[test]
    fn explicit_release_returns_true() {
        let store = Arc::new(InMemoryStore::new());
        let mut lock = lock_on(&store);
        let mut guard = lock
            .acquire_scoped(Duration::from_secs(2), Duration::ZERO)
            .unwrap()
            .unwrap();
        assert!(guard.update(Duration::from_secs(3)).unwrap());
        assert!(guard.release().unwrap());
        assert!(!lock.is_exists());
    }

    #[test]
    fn busy_lock_yields_no_guard() {
        let store = Arc::new(InMemoryStore::new());
        let mut holder = lock_on(&store);
        let mut contender = lock_on(&store);
        holder.acquire(Duration::from_secs(2), Duration::ZERO).unwrap();

        let guard = contender
            .acquire_scoped(Duration::from_secs(2), Duration::ZERO)
            .unwrap();
        assert!(guard.is_none());
    }

    #[test]
    fn with_lock_releases_after_closure() {
        let store = Arc::new(InMemoryStore::new());
        let mut lock = lock_on(&store);

        let value = lock
            .with_lock(Duration::from_secs(2), Duration::ZERO, |guard| {
                assert!(guard.is_locked().unwrap());
                41 + 1
            })
            .unwrap();

        assert_eq!(value, Some(42));
        assert!(!lock.is_acquired());
        assert!(!lock.is_exists());
    }

    #[test]
    fn with_lock_releases_on_panic() {
        let store = Arc::new(InMemoryStore::new());
        let mut lock = lock_on(&store);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _: Result<Option<()>> =
                lock.with_lock(Duration::from_secs(2), Duration::ZERO, |_| {
                    panic!("critical section failed");
                });
        }));
        assert!(outcome.is_err());

        let mut other = lock_on(&store);
        assert!(!other.is_exists());
        assert!(other.acquire(Duration::from_secs(2), Duration::ZERO).unwrap());
    }

    #[test]
    fn guard_release_reports_loss_seen_by_is_locked() {
        let store = Arc::new(InMemoryStore::new());
        let mut lock = lock_on(&store);
        let mut guard = lock
            .acquire_scoped(Duration::from_secs(2), Duration::ZERO)
            .unwrap()
            .unwrap();

        store.delete("guarded").unwrap();
        assert!(guard.is_locked().unwrap_err().is_lost_lock());
        assert!(guard.release().unwrap_err().is_lost_lock());
    }

    #[test]
    fn with_lock_reports_lock_lost_inside_closure() {
        let store = Arc::new(InMemoryStore::new());
        let mut lock = lock_on(&store);
        let intruder = store.clone();

        let err = lock
            .with_lock(Duration::from_secs(2), Duration::ZERO, |guard| {
                intruder.delete(guard.key()).unwrap();
            })
            .unwrap_err();
        assert!(matches!(err, MemlockError::LostLock { .. }));
    }
}
