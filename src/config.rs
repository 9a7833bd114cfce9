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
use crate::locking::{LockOptions, seconds};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "MEMLOCK";
const DEFAULT_LOCK_DURATION_SECS: f64 = 1.0;
const DEFAULT_RETRY_INTERVAL_MS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct MemlockConfig {
    #[serde(default)]
    pub lock: LockingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockingConfig {
    #[serde(default)]
    pub catch_exceptions: bool,

    #[serde(default)]
    pub self_expire_sync: bool,

    #[serde(default = "default_lock_duration_secs")]
    pub lock_duration_secs: f64,

    #[serde(default)]
    pub wait_secs: f64,

    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            catch_exceptions: false,
            self_expire_sync: false,
            lock_duration_secs: DEFAULT_LOCK_DURATION_SECS,
            wait_secs: 0.0,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
        }
    }
}

fn default_lock_duration_secs() -> f64 {
    DEFAULT_LOCK_DURATION_SECS
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

impl LockingConfig {
    pub fn options(&self) -> LockOptions {
        LockOptions::new()
            .with_catch_exceptions(self.catch_exceptions)
            .with_self_expire_sync(self.self_expire_sync)
    }

    pub fn lock_duration(&self) -> Result<Duration> {
        let duration = seconds(self.lock_duration_secs)?;
        self.options().validate_lock_duration(duration)?;
        Ok(duration)
    }

    pub fn wait(&self) -> Result<Duration> {
        seconds(self.wait_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

/// Loads configuration from built-in defaults, an optional TOML file, and
/// `MEMLOCK_*` environment variables, in increasing order of precedence.
///
/// Nested keys use a double underscore, e.g. `MEMLOCK_LOCK__SELF_EXPIRE_SYNC=true`.
pub fn new_memlock_config(path: Option<&Path>) -> Result<MemlockConfig> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(MemlockError::ConfigError(format!(
                "Config file not found at {}",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path).format(FileFormat::Toml));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let settings = builder
        .build()
        .map_err(|e| MemlockError::ConfigError(format!("Failed to load configuration: {e}")))?;
    let config: MemlockConfig = settings
        .try_deserialize()
        .map_err(|e| MemlockError::ConfigError(format!("Invalid configuration: {e}")))?;

    log::debug!("Loaded configuration: {config:?}");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn clear_env() {
        unsafe {
            std::env::remove_var("MEMLOCK_LOCK__SELF_EXPIRE_SYNC");
            std::env::remove_var("MEMLOCK_LOCK__WAIT_SECS");
        }
    }

    #[test]
    fn test_default_config() {
        let config = MemlockConfig::default();
        assert!(!config.lock.catch_exceptions);
        assert!(!config.lock.self_expire_sync);
        assert_eq!(config.lock.lock_duration().unwrap(), Duration::from_secs(1));
        assert_eq!(config.lock.wait().unwrap(), Duration::ZERO);
        assert_eq!(config.lock.retry_interval(), Duration::from_millis(5));
    }

    #[test]
    #[serial]
    fn test_load_without_file_uses_defaults() {
        clear_env();
        let config = new_memlock_config(None).unwrap();
        assert_eq!(config, MemlockConfig::default());
    }

    #[test]
    #[serial]
    fn test_partial_file() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memlock.toml");
        fs::write(
            &path,
            r#"
[lock]
self_expire_sync = true
lock_duration_secs = 0.25
"#,
        )
        .unwrap();

        let config = new_memlock_config(Some(&path)).unwrap();
        assert!(config.lock.self_expire_sync);
        assert!(!config.lock.catch_exceptions);
        assert_eq!(
            config.lock.lock_duration().unwrap(),
            Duration::from_millis(250)
        );
        assert_eq!(config.lock.retry_interval_ms, DEFAULT_RETRY_INTERVAL_MS);
    }

    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memlock.toml");
        fs::write(&path, "[lock]\nself_expire_sync = false\nwait_secs = 1.0\n").unwrap();

        unsafe {
            std::env::set_var("MEMLOCK_LOCK__SELF_EXPIRE_SYNC", "true");
            std::env::set_var("MEMLOCK_LOCK__WAIT_SECS", "2.5");
        }
        let config = new_memlock_config(Some(&path));
        clear_env();

        let config = config.unwrap();
        assert!(config.lock.self_expire_sync);
        assert_eq!(config.lock.wait().unwrap(), Duration::from_millis(2_500));
    }

    #[test]
    #[serial]
    fn test_missing_file_is_error() {
        clear_env();
        let temp_dir = TempDir::new().unwrap();
        let err = new_memlock_config(Some(&temp_dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, MemlockError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_durations_are_rejected() {
        let config = LockingConfig {
            lock_duration_secs: 0.5,
            ..LockingConfig::default()
        };
        assert!(matches!(
            config.lock_duration(),
            Err(MemlockError::InvalidArgument(_))
        ));

        let config = LockingConfig {
            lock_duration_secs: 0.5,
            self_expire_sync: true,
            wait_secs: -1.0,
            ..LockingConfig::default()
        };
        assert!(config.lock_duration().is_ok());
        assert!(matches!(
            config.wait(),
            Err(MemlockError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = MemlockConfig {
            lock: LockingConfig {
                catch_exceptions: true,
                ..LockingConfig::default()
            },
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert!(text.contains("catch_exceptions = true"));
        let parsed: MemlockConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
