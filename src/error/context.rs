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

use crate::error::MemlockError;
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a MemlockError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a MemlockError) -> Self {
        let (suggestion, details) = match error {
            MemlockError::InvalidArgument(msg) => {
                let suggestion = Some(
                    "Lock durations must be at least 1s when the store TTL is authoritative, or \
                     10ms with self-expire sync enabled. Wait budgets must not be negative."
                        .to_string(),
                );
                (suggestion, Some(msg.clone()))
            }
            MemlockError::LockAlreadyAcquired { key } => {
                let suggestion = Some(
                    "Locks are not re-entrant. Release the lock or call update() to extend it."
                        .to_string(),
                );
                let details = Some(format!("This handle already holds '{key}'"));
                (suggestion, details)
            }
            MemlockError::NotAcquired { key } => {
                let suggestion =
                    Some("Acquire the lock before releasing or updating it.".to_string());
                let details = Some(format!("No ownership is recorded for '{key}'"));
                (suggestion, details)
            }
            MemlockError::LostLock { key, details } => {
                let suggestion = Some(
                    "The lock expired and was taken over, or the key was modified outside the \
                     lock protocol. Use a longer lock duration or renew it with update() before \
                     it expires."
                        .to_string(),
                );
                (suggestion, Some(format!("'{key}': {details}")))
            }
            MemlockError::Store(msg) => {
                let suggestion =
                    Some("Check that the cache server is reachable and healthy.".to_string());
                (suggestion, Some(msg.clone()))
            }
            MemlockError::ConfigError(msg) => {
                let suggestion = Some(
                    "Check the configuration file syntax and MEMLOCK_* environment variables."
                        .to_string(),
                );
                (suggestion, Some(msg.clone()))
            }
            MemlockError::Io(err) => (None, Some(err.to_string())),
            MemlockError::Json(err) => (None, Some(err.to_string())),
        };

        Self {
            error,
            suggestion,
            details,
        }
    }
}

impl fmt::Display for ErrorContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\n\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}
