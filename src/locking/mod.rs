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

pub mod acquisition;
pub mod handle;
pub mod options;
pub mod scoped_guard;
pub mod token;
pub mod wait_observer;

pub use acquisition::{AcquireMode, AcquireRequest, WaitBudget};
pub use handle::CasLock;
pub use options::{
    DEFAULT_RETRY_INTERVAL, LockOptions, MIN_LOCK_DURATION_SELF_EXPIRE,
    MIN_LOCK_DURATION_STORE_TTL, MIN_RETRY_INTERVAL, seconds,
};
pub use scoped_guard::ScopedLockGuard;
pub use token::LockToken;
pub use wait_observer::{LockWaitObserver, NoopLockWaitObserver};
