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
use crate::store::{CasEntry, CasStore, CasVersion};
use log::trace;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

struct StoredItem {
    value: Vec<u8>,
    version: CasVersion,
    expires_at: Option<Instant>,
}

impl StoredItem {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }
}

#[derive(Default)]
struct State {
    items: HashMap<String, StoredItem>,
    last_version: u64,
}

impl State {
    fn next_version(&mut self) -> CasVersion {
        self.last_version += 1;
        CasVersion::new(self.last_version)
    }

    fn live(&mut self, key: &str, now: Instant) -> Option<&StoredItem> {
        if self.items.get(key).is_some_and(|item| item.is_expired(now)) {
            trace!("Evicting expired key {key}");
            self.items.remove(key);
        }
        self.items.get(key)
    }

    fn sweep(&mut self, now: Instant) {
        let before = self.items.len();
        self.items.retain(|_, item| !item.is_expired(now));
        let evicted = before - self.items.len();
        if evicted > 0 {
            trace!("Evicted {evicted} expired keys");
        }
    }

    fn write(&mut self, key: &str, value: &[u8], ttl_secs: u32, now: Instant) -> CasVersion {
        self.sweep(now);
        let version = self.next_version();
        let expires_at = (ttl_secs > 0).then(|| now + Duration::from_secs(u64::from(ttl_secs)));
        self.items.insert(
            key.to_string(),
            StoredItem {
                value: value.to_vec(),
                version,
                expires_at,
            },
        );
        version
    }
}

/// Process-local cache with memcached-style CAS semantics.
///
/// Every successful write receives a fresh version from a counter shared by
/// all keys, so a version never repeats. Expired entries are evicted when
/// read and swept on every write.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| MemlockError::Store("in-memory store mutex poisoned".to_string()))
    }

    /// Unconditionally writes `value`, bypassing the lock protocol.
    pub fn set(&self, key: &str, value: &[u8], ttl_secs: u32) -> Result<CasVersion> {
        let mut state = self.lock_state()?;
        Ok(state.write(key, value, ttl_secs, Instant::now()))
    }

    /// Returns the live value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read(key)?.map(|entry| entry.value))
    }

    /// Removes `key`, returning whether a live entry existed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut state = self.lock_state()?;
        let now = Instant::now();
        let existed = state.live(key, now).is_some();
        state.items.remove(key);
        Ok(existed)
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<usize> {
        let mut state = self.lock_state()?;
        state.sweep(Instant::now());
        Ok(state.items.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl CasStore for InMemoryStore {
    fn insert_if_absent(&self, key: &str, value: &[u8], ttl_secs: u32) -> Result<bool> {
        let mut state = self.lock_state()?;
        let now = Instant::now();
        if state.live(key, now).is_some() {
            return Ok(false);
        }
        state.write(key, value, ttl_secs, now);
        Ok(true)
    }

    fn compare_and_swap(
        &self,
        version: CasVersion,
        key: &str,
        value: &[u8],
        ttl_secs: u32,
    ) -> Result<bool> {
        let mut state = self.lock_state()?;
        let now = Instant::now();
        let current = state
            .live(key, now)
            .is_some_and(|item| item.version == version);
        if !current {
            return Ok(false);
        }
        state.write(key, value, ttl_secs, now);
        Ok(true)
    }

    fn read(&self, key: &str) -> Result<Option<CasEntry>> {
        let mut state = self.lock_state()?;
        let now = Instant::now();
        Ok(state.live(key, now).map(|item| CasEntry {
            value: item.value.clone(),
            version: item.version,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn insert_if_absent_only_stores_once() {
        let store = InMemoryStore::new();
        assert!(store.insert_if_absent("key1", b"a", 10).unwrap());
        assert!(!store.insert_if_absent("key1", b"b", 10).unwrap());
        assert_eq!(store.get("key1").unwrap().as_deref(), Some(&b"a"[..]));
    }

    #[test]
    fn compare_and_swap_requires_current_version() {
        let store = InMemoryStore::new();
        store.insert_if_absent("key1", b"a", 0).unwrap();
        let entry = store.read("key1").unwrap().unwrap();

        assert!(store.compare_and_swap(entry.version, "key1", b"b", 0).unwrap());
        assert!(!store.compare_and_swap(entry.version, "key1", b"c", 0).unwrap());

        let current = store.read("key1").unwrap().unwrap();
        assert_eq!(current.value, b"b");
        assert_ne!(current.version, entry.version);
    }

    #[test]
    fn compare_and_swap_on_missing_key_fails() {
        let store = InMemoryStore::new();
        assert!(
            !store
                .compare_and_swap(CasVersion::new(1), "missing", b"x", 0)
                .unwrap()
        );
        assert!(store.read("missing").unwrap().is_none());
    }

    #[test]
    fn versions_never_repeat_across_keys() {
        let store = InMemoryStore::new();
        let first = store.set("a", b"1", 0).unwrap();
        let second = store.set("b", b"1", 0).unwrap();
        store.delete("a").unwrap();
        let third = store.set("a", b"1", 0).unwrap();
        assert!(first.as_u64() < second.as_u64());
        assert!(second.as_u64() < third.as_u64());
    }

    #[test]
    fn entries_expire_after_ttl() {
        let store = InMemoryStore::new();
        store.insert_if_absent("key1", b"a", 1).unwrap();
        assert!(store.read("key1").unwrap().is_some());

        thread::sleep(Duration::from_millis(1_050));

        assert!(store.read("key1").unwrap().is_none());
        assert!(store.insert_if_absent("key1", b"b", 1).unwrap());
    }

    #[test]
    fn writes_sweep_expired_keys() {
        let store = InMemoryStore::new();
        for i in 0..20 {
            store.set(&format!("short{i}"), b"a", 1).unwrap();
        }
        store.set("forever", b"b", 0).unwrap();

        thread::sleep(Duration::from_millis(1_050));
        store.set("fresh", b"c", 0).unwrap();

        let state = store.state.lock().unwrap();
        assert_eq!(state.items.len(), 2);
        assert!(state.items.contains_key("forever"));
        assert!(state.items.contains_key("fresh"));
    }

    #[test]
    fn delete_reports_presence() {
        let store = InMemoryStore::new();
        store.set("key1", b"a", 0).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.delete("key1").unwrap());
        assert!(!store.delete("key1").unwrap());
        assert!(store.is_empty().unwrap());
    }
}
