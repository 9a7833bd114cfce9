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

//! Key-value cache capability the lock protocol is built on.
//!
//! The protocol only needs three atomic operations from the backing cache:
//! insert-if-absent, compare-and-swap against a previously read version, and a
//! versioned read. Any memcached-like server offering `add`, `cas` and `gets`
//! can implement [`CasStore`].

pub mod memory;

pub use memory::InMemoryStore;

use crate::error::Result;
use std::fmt;

/// Opaque version token returned by [`CasStore::read`] and consumed by
/// [`CasStore::compare_and_swap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CasVersion(u64);

impl CasVersion {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CasVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value read from the store together with the version it was written at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasEntry {
    pub value: Vec<u8>,
    pub version: CasVersion,
}

/// Atomic primitives required from the shared cache.
///
/// TTLs are whole seconds and `0` means the entry never expires, matching the
/// memcached protocol. Transport failures are reported as
/// [`MemlockError::Store`](crate::error::MemlockError::Store); a missing key is
/// not an error.
pub trait CasStore: Send + Sync {
    /// Stores `value` only if `key` does not exist. Returns `true` when stored.
    fn insert_if_absent(&self, key: &str, value: &[u8], ttl_secs: u32) -> Result<bool>;

    /// Replaces `key` only if its current version equals `version`.
    fn compare_and_swap(
        &self,
        version: CasVersion,
        key: &str,
        value: &[u8],
        ttl_secs: u32,
    ) -> Result<bool>;

    /// Reads `key`, returning `None` when it does not exist or has expired.
    fn read(&self, key: &str) -> Result<Option<CasEntry>>;
}
