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

pub fn get_exit_code(error: &MemlockError) -> i32 {
    match error {
        MemlockError::InvalidArgument(_) | MemlockError::ConfigError(_) => 2,

        MemlockError::LockAlreadyAcquired { .. } => 3,

        MemlockError::LostLock { .. } => 4,

        MemlockError::NotAcquired { .. } => 5,

        MemlockError::Store(_) => 69, // EX_UNAVAILABLE from sysexits.h

        _ => 1,
    }
}
