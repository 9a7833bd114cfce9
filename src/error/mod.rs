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

mod context;
mod exit_codes;
mod format;

pub use context::ErrorContext;
pub use exit_codes::get_exit_code;
pub use format::{format_error_chain, format_error_with_color};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemlockError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Lock '{key}' is already acquired by this handle")]
    LockAlreadyAcquired { key: String },

    #[error("Lock '{key}' is not acquired")]
    NotAcquired { key: String },

    #[error("Lock '{key}' was lost: {details}")]
    LostLock { key: String, details: String },

    #[error("Store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MemlockError {
    /// Errors describing the handle's ownership state rather than a caller bug
    /// or an infrastructure failure. These are the ones a handle configured with
    /// `catch_exceptions` reports as `false`.
    pub fn is_lock_state(&self) -> bool {
        matches!(
            self,
            MemlockError::LockAlreadyAcquired { .. }
                | MemlockError::NotAcquired { .. }
                | MemlockError::LostLock { .. }
        )
    }

    pub fn is_lost_lock(&self) -> bool {
        matches!(self, MemlockError::LostLock { .. })
    }
}

pub type Result<T> = std::result::Result<T, MemlockError>;
