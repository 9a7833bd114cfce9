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

use crate::config::MemlockConfig;
use crate::error::{MemlockError, Result};

/// Prints the effective configuration after file and environment layering.
pub struct ConfigCommand<'a> {
    config: &'a MemlockConfig,
}

impl<'a> ConfigCommand<'a> {
    pub fn new(config: &'a MemlockConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self) -> Result<()> {
        print!("{}", self.render()?);
        Ok(())
    }

    pub fn render(&self) -> Result<String> {
        toml::to_string_pretty(self.config)
            .map_err(|e| MemlockError::ConfigError(format!("Failed to render configuration: {e}")))
    }
}
