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

//! Lock token codec.
//!
//! The value stored under a lock key is the UTF-8 string
//! `<expiry-millis>:<identity>`. The identity may itself contain colons, so
//! decoding splits on the first colon only. Third parties read the expiry to
//! decide whether the current holder is stale.

use chrono::Utc;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Milliseconds since the Unix epoch according to the local wall clock.
pub fn now_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0)
}

/// Builds a per-handle identity from the process id, a nanosecond timestamp
/// and a random UUID.
pub fn generate_identity() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!(
        "{}:{}:{}",
        std::process::id(),
        nanos,
        Uuid::new_v4().simple()
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    expires_at_ms: u64,
    identity: String,
}

impl LockToken {
    pub fn new(expires_at_ms: u64, identity: impl Into<String>) -> Self {
        Self {
            expires_at_ms,
            identity: identity.into(),
        }
    }

    /// Token for `identity` expiring `lock_duration` from now.
    pub fn expiring_in(lock_duration: Duration, identity: &str) -> Self {
        let duration_ms = u64::try_from(lock_duration.as_millis()).unwrap_or(u64::MAX);
        Self::new(now_millis().saturating_add(duration_ms), identity)
    }

    pub fn expires_at_ms(&self) -> u64 {
        self.expires_at_ms
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// A zero expiry marks a released or foreign value.
    pub fn has_expiry(&self) -> bool {
        self.expires_at_ms > 0
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at_ms < now_ms
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Decodes a stored value. Decoding never fails: an unreadable expiry is
    /// reported as zero so callers treat the holder as stale.
    pub fn decode(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let (expiry, identity) = text.split_once(':').unwrap_or((&text, ""));
        Self {
            expires_at_ms: expiry.trim().parse().unwrap_or(0),
            identity: identity.to_string(),
        }
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.expires_at_ms, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn identity_contains_pid_and_is_unique() {
        let first = generate_identity();
        let second = generate_identity();
        assert_ne!(first, second);

        let pid = first.split(':').next().unwrap();
        assert_eq!(pid.parse::<u32>().unwrap(), std::process::id());
        assert_eq!(first.split(':').count(), 3);
    }

    #[test]
    fn encode_uses_expiry_colon_identity() {
        let token = LockToken::new(1_700_000_000_123, "42:abc:7");
        assert_eq!(token.encode(), b"1700000000123:42:abc:7".to_vec());
    }

    #[test]
    fn decode_splits_on_first_colon_only() {
        let mut rng = rand::thread_rng();
        for _ in 0..9 {
            let expiry: u64 = rng.gen_range(1..u64::from(u32::MAX));
            let identity = format!(
                "{}:{}:{}",
                std::process::id(),
                rng.r#gen::<u64>(),
                rng.gen_range(1..9999)
            );
            let raw = format!("{expiry}:{identity}");

            let token = LockToken::decode(raw.as_bytes());
            assert_eq!(token.expires_at_ms(), expiry);
            assert_eq!(token.identity(), identity);
        }
    }

    #[test]
    fn decode_released_sentinel_has_no_expiry() {
        let token = LockToken::decode(b"0");
        assert_eq!(token.expires_at_ms(), 0);
        assert_eq!(token.identity(), "");
        assert!(!token.has_expiry());
        assert!(token.is_expired_at(1));
    }

    #[test]
    fn decode_garbage_reads_as_stale() {
        assert_eq!(LockToken::decode(b"not-a-number:me").expires_at_ms(), 0);
        assert_eq!(LockToken::decode(b"").expires_at_ms(), 0);
        assert_eq!(LockToken::decode(&[0xff, 0xfe]).expires_at_ms(), 0);
    }

    #[test]
    fn expiring_in_is_relative_to_now() {
        let before = now_millis();
        let token = LockToken::expiring_in(Duration::from_millis(1_500), "me");
        let after = now_millis();

        assert!(token.expires_at_ms() >= before + 1_500);
        assert!(token.expires_at_ms() <= after + 1_500);
        assert!(!token.is_expired_at(after));
    }
}
