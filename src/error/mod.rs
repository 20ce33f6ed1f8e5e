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
pub enum RelayError {
    #[error("Relay {device} has already been locked")]
    LockContended { device: String },

    #[error("Not able to write lock file {path}: {details}")]
    LockWrite { path: String, details: String },

    #[error("Not able to read lock file {path}: {details}")]
    LockRead { path: String, details: String },

    #[error("Cannot process because processor runner has been already shut down")]
    ProcessorRejected,

    #[error("Cannot execute {task} task for {device}: {details}")]
    Processing {
        task: String,
        device: String,
        details: String,
    },

    #[error("{operation} has been cancelled")]
    Cancelled { operation: String },

    #[error("Relays discovery timeout ({timeout_ms} ms) has been exceeded")]
    DiscoveryTimeout { timeout_ms: u128 },

    #[error("Device {device} failed: {details}")]
    Device { device: String, details: String },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("System error: {0}")]
    SystemError(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Convenience constructor used by driver implementations.
    pub fn device(device: impl Into<String>, details: impl Into<String>) -> Self {
        RelayError::Device {
            device: device.into(),
            details: details.into(),
        }
    }

    /// Soft failures that callers should treat as "did not complete".
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RelayError::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
