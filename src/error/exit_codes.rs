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

use crate::error::RelayError;

pub fn get_exit_code(error: &RelayError) -> i32 {
    match error {
        RelayError::InvalidArgument(_) | RelayError::ConfigError(_) => 2,

        RelayError::LockContended { .. } => 16, // EBUSY

        RelayError::DiscoveryTimeout { .. } => 62, // ETIME

        RelayError::Device { .. } | RelayError::Driver(_) => 5, // EIO

        RelayError::Cancelled { .. } => 130,

        _ => 1,
    }
}
