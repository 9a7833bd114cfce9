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

//! Distributed mutual-exclusion lock built on a compare-and-swap key/value
//! store.
//!
//! A [`locking::CasLock`] names a key in a shared [`store::CasStore`]. The
//! value stored under the key records who holds the lock and until when, so
//! any participant can detect and take over a lock whose holder went away.

pub mod commands;
pub mod config;
pub mod error;
pub mod locking;
pub mod logging;
pub mod store;

pub use error::{MemlockError, Result};
pub use locking::{CasLock, LockOptions, ScopedLockGuard};
pub use store::{CasEntry, CasStore, CasVersion, InMemoryStore};
