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

//! Lock handle bound to one key of a shared CAS store.
//!
//! Ownership is claimed by writing a [`LockToken`] with `insert_if_absent`, or
//! by overwriting a stale holder's token with `compare_and_swap` against the
//! version just read. Every successful write is confirmed by reading the key
//! back; the version captured at that moment guards later renewals and the
//! release, so a handle can never clobber a lock that was taken over.

use crate::error::{MemlockError, Result};
use crate::locking::acquisition::{AcquireProgress, AcquireRequest};
use crate::locking::options::{LockOptions, RELEASED_SENTINEL, RELEASED_TTL_SECS, store_ttl_secs};
use crate::locking::scoped_guard::ScopedLockGuard;
use crate::locking::token::{LockToken, generate_identity, now_millis};
use crate::store::{CasStore, CasVersion};
use log::{debug, trace, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Per-process handle on a distributed lock.
///
/// A handle is meant for a single caller; wrap it in a mutex if it must be
/// shared between threads.
pub struct CasLock {
    store: Arc<dyn CasStore>,
    key: String,
    identity: String,
    options: LockOptions,
    owned_version: Option<CasVersion>,
    local_expiry_ms: u64,
    acquired_at: Option<Instant>,
    /// Set when `is_locked` or `update` found the hold taken over, so the
    /// next `release` reports the loss instead of `NotAcquired`.
    lost_hold: bool,
}

impl CasLock {
    pub fn new(
        store: Arc<dyn CasStore>,
        key: impl Into<String>,
        options: LockOptions,
    ) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(MemlockError::InvalidArgument(
                "lock key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            store,
            key,
            identity: generate_identity(),
            options,
            owned_version: None,
            local_expiry_ms: 0,
            acquired_at: None,
            lost_hold: false,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn options(&self) -> LockOptions {
        self.options
    }

    /// Expiry of the current hold according to this handle's clock.
    pub fn expires_at_ms(&self) -> Option<u64> {
        self.owned_version.map(|_| self.local_expiry_ms)
    }

    /// Local view of ownership: a confirmed version whose expiry has not
    /// passed. No store round trip.
    pub fn is_acquired(&self) -> bool {
        self.owned_version.is_some() && self.local_expiry_ms > now_millis()
    }

    pub(crate) fn holds_version(&self) -> bool {
        self.owned_version.is_some()
    }

    /// Tries to take the lock for `lock_duration`, retrying for up to `wait`.
    ///
    /// A zero `wait` makes a single attempt. Returns `Ok(false)` when the lock
    /// stayed busy for the whole budget.
    pub fn acquire(&mut self, lock_duration: Duration, wait: Duration) -> Result<bool> {
        self.acquire_with(&AcquireRequest::new(lock_duration).with_wait(wait))
    }

    pub fn acquire_with(&mut self, request: &AcquireRequest<'_>) -> Result<bool> {
        self.options
            .validate_lock_duration(request.lock_duration())?;

        if self.is_acquired() {
            return self.reject(MemlockError::LockAlreadyAcquired {
                key: self.key.clone(),
            });
        }
        self.clear();
        self.lost_hold = false;

        let key = self.key.clone();
        let ttl_secs = store_ttl_secs(request.lock_duration());
        let mut progress = AcquireProgress::start(&key, request);

        loop {
            let token = LockToken::expiring_in(request.lock_duration(), &self.identity);
            let encoded = token.encode();

            if self.store.insert_if_absent(&key, &encoded, ttl_secs)? {
                if self.confirm(&token)? {
                    debug!(
                        "Acquired lock {key} after {:.3}s ({} retries)",
                        progress.elapsed().as_secs_f64(),
                        progress.retries()
                    );
                    progress.notify_acquired();
                    return Ok(true);
                }
                debug!("Lock {key} was overwritten before it could be confirmed");
                if progress.retry_immediately() {
                    continue;
                }
            } else {
                match self.store.read(&key)? {
                    None => {
                        trace!("Lock {key} disappeared between insert and read");
                        if progress.retry_immediately() {
                            continue;
                        }
                    }
                    Some(entry) => {
                        let holder = LockToken::decode(&entry.value);
                        if self.is_stale(&holder) {
                            progress.notify_stale_holder(holder.expires_at_ms());
                            debug!(
                                "Holder of {key} is stale (expiry {}); attempting takeover",
                                holder.expires_at_ms()
                            );
                            if self
                                .store
                                .compare_and_swap(entry.version, &key, &encoded, ttl_secs)?
                                && self.confirm(&token)?
                            {
                                debug!(
                                    "Took over stale lock {key} after {:.3}s",
                                    progress.elapsed().as_secs_f64()
                                );
                                progress.notify_acquired();
                                return Ok(true);
                            }
                            trace!("Takeover of {key} lost to another acquirer");
                        }
                    }
                }
            }

            match progress.next_pause() {
                Some(pause) => thread::sleep(pause),
                None => break,
            }
            if progress.is_spent() {
                break;
            }
        }

        progress.notify_timeout();
        debug!(
            "Lock {key} still busy after {:.3}s; giving up",
            progress.elapsed().as_secs_f64()
        );
        Ok(false)
    }

    /// Releases the lock by overwriting it with the released sentinel, guarded
    /// by the version captured at acquisition.
    ///
    /// Local state is cleared whatever the outcome. Fails with `LostLock` when
    /// another holder took the key over in the meantime.
    pub fn release(&mut self) -> Result<bool> {
        let Some(version) = self.owned_version else {
            if std::mem::take(&mut self.lost_hold) {
                return self.reject(self.lost("taken over before release"));
            }
            return self.reject(MemlockError::NotAcquired {
                key: self.key.clone(),
            });
        };

        let held_for = self.acquired_at.map(|at| at.elapsed());
        let released =
            self.store
                .compare_and_swap(version, &self.key, RELEASED_SENTINEL, RELEASED_TTL_SECS);
        self.clear();

        if !released? {
            return self.reject(self.lost("version changed before release"));
        }

        debug!(
            "Released lock {} after {:.3}s",
            self.key,
            held_for.unwrap_or_default().as_secs_f64()
        );
        Ok(true)
    }

    /// Extends the current hold so it expires `lock_duration` from now.
    pub fn update(&mut self, lock_duration: Duration) -> Result<bool> {
        self.options.validate_lock_duration(lock_duration)?;

        let version = match self.owned_version {
            Some(version) if self.is_acquired() => version,
            _ => {
                return self.reject(MemlockError::NotAcquired {
                    key: self.key.clone(),
                });
            }
        };

        let token = LockToken::expiring_in(lock_duration, &self.identity);
        let ttl_secs = store_ttl_secs(lock_duration);
        if self
            .store
            .compare_and_swap(version, &self.key, &token.encode(), ttl_secs)?
            && self.confirm(&token)?
        {
            debug!(
                "Extended lock {} by {:.3}s",
                self.key,
                lock_duration.as_secs_f64()
            );
            return Ok(true);
        }

        self.forfeit("version changed before update")
    }

    /// Checks against the store that this handle still owns the lock.
    ///
    /// Returns `false` without a round trip when nothing is held. Any
    /// disagreement with the store (missing key, foreign version, foreign or
    /// expired token) clears the local state and is reported as `LostLock`.
    pub fn is_locked(&mut self) -> Result<bool> {
        let Some(version) = self.owned_version else {
            return Ok(false);
        };

        let Some(entry) = self.store.read(&self.key)? else {
            return self.forfeit("key not found");
        };

        if entry.version != version {
            return self.forfeit("key has a different CAS version");
        }

        let now = now_millis();
        if self.local_expiry_ms > now && entry.value == self.current_token().encode() {
            return Ok(true);
        }

        let stored = LockToken::decode(&entry.value);
        let details = if stored.is_expired_at(now) {
            format!("expired at {}", stored.expires_at_ms())
        } else {
            "stored token belongs to another holder".to_string()
        };
        self.forfeit(details)
    }

    /// Whether anyone currently holds the lock. Read-only; never fails.
    pub fn is_exists(&self) -> bool {
        match self.store.read(&self.key) {
            Ok(Some(entry)) => {
                let holder = LockToken::decode(&entry.value);
                if self.options.self_expire_sync {
                    holder.expires_at_ms() > now_millis()
                } else {
                    holder.has_expiry()
                }
            }
            Ok(None) => false,
            Err(err) => {
                warn!("Failed to read lock {}: {err}", self.key);
                false
            }
        }
    }

    /// Acquires the lock and returns a guard releasing it on drop.
    pub fn acquire_scoped(
        &mut self,
        lock_duration: Duration,
        wait: Duration,
    ) -> Result<Option<ScopedLockGuard<'_>>> {
        if self.acquire(lock_duration, wait)? {
            Ok(Some(ScopedLockGuard::new(self)))
        } else {
            Ok(None)
        }
    }

    /// Runs `critical_section` while holding the lock.
    ///
    /// Returns `Ok(None)` if the lock could not be acquired within `wait`. The
    /// lock is released on every exit path, including a panic inside the
    /// closure. A lock lost while the closure ran is reported as `LostLock`.
    pub fn with_lock<T, F>(
        &mut self,
        lock_duration: Duration,
        wait: Duration,
        critical_section: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&mut ScopedLockGuard<'_>) -> T,
    {
        let Some(mut guard) = self.acquire_scoped(lock_duration, wait)? else {
            return Ok(None);
        };
        let value = critical_section(&mut guard);
        guard.release()?;
        Ok(Some(value))
    }

    fn current_token(&self) -> LockToken {
        LockToken::new(self.local_expiry_ms, self.identity.as_str())
    }

    fn is_stale(&self, holder: &LockToken) -> bool {
        if self.options.self_expire_sync {
            holder.is_expired_at(now_millis())
        } else {
            // The store's TTL keeps live holders alive; only a value without
            // an expiry (released sentinel) is free for the taking.
            !holder.has_expiry()
        }
    }

    fn confirm(&mut self, token: &LockToken) -> Result<bool> {
        match self.store.read(&self.key)? {
            Some(entry) if entry.value == token.encode() => {
                self.owned_version = Some(entry.version);
                self.local_expiry_ms = token.expires_at_ms();
                self.acquired_at.get_or_insert_with(Instant::now);
                Ok(true)
            }
            _ => {
                self.clear();
                Ok(false)
            }
        }
    }

    fn clear(&mut self) {
        self.owned_version = None;
        self.local_expiry_ms = 0;
        self.acquired_at = None;
    }

    /// Drops a hold that was taken over and reports the loss.
    fn forfeit(&mut self, details: impl Into<String>) -> Result<bool> {
        self.clear();
        self.lost_hold = true;
        self.reject(self.lost(details))
    }

    fn lost(&self, details: impl Into<String>) -> MemlockError {
        MemlockError::LostLock {
            key: self.key.clone(),
            details: details.into(),
        }
    }

    fn reject(&self, error: MemlockError) -> Result<bool> {
        if self.options.catch_exceptions && error.is_lock_state() {
            debug!("{error}");
            return Ok(false);
        }
        Err(error)
    }
}

impl Drop for CasLock {
    fn drop(&mut self) {
        if !self.is_acquired() {
            return;
        }

        let Some(version) = self.owned_version.take() else {
            return;
        };
        match self
            .store
            .compare_and_swap(version, &self.key, RELEASED_SENTINEL, RELEASED_TTL_SECS)
        {
            Ok(true) => debug!("Released lock {} on drop", self.key),
            Ok(false) => warn!("Lock {} was lost before it could be released on drop", self.key),
            Err(err) => warn!("Failed to release lock {} during drop: {err}", self.key),
        }
    }
}
