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
use std::fmt;

pub struct ErrorContext<'a> {
    pub error: &'a RelayError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a RelayError) -> Self {
        let (suggestion, details) = match error {
            RelayError::LockContended { device } => (
                Some(
                    "Another process is using this relay. Close it there first, or wait until \
                     its heartbeat goes stale."
                        .to_string(),
                ),
                Some(format!("Fresh heartbeat found for {device}")),
            ),
            RelayError::LockWrite { path, .. } | RelayError::LockRead { path, .. } => (
                Some(
                    "Check that the lock directory is writable, or run 'relaykit locks' to sweep \
                     stale lock files."
                        .to_string(),
                ),
                Some(format!("Lock file: {path}")),
            ),
            RelayError::ProcessorRejected => (
                Some("The relay registry has been shut down. Create a new one.".to_string()),
                None,
            ),
            RelayError::DiscoveryTimeout { timeout_ms } => (
                Some(
                    "The driver is slow to enumerate devices. Increase discovery.timeout_ms in \
                     relay.toml."
                        .to_string(),
                ),
                Some(format!("Waited {timeout_ms} ms for the first enumeration")),
            ),
            RelayError::ConfigError(_) => (
                Some("Check the syntax of relay.toml.".to_string()),
                None,
            ),
            RelayError::Device { device, .. } => (
                Some(format!("Check that {device} is connected and not in use.")),
                None,
            ),
            _ => (None, None),
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
