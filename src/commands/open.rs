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

use crate::commands::build_registry;
use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use log::info;
use std::thread;
use std::time::Duration;

/// Opens one relay, optionally holds it, then closes it again.
pub struct OpenCommand<'a> {
    config: &'a RelayConfig,
    dummy: Option<usize>,
}

impl<'a> OpenCommand<'a> {
    pub fn new(config: &'a RelayConfig, dummy: Option<usize>) -> Result<Self> {
        Ok(Self { config, dummy })
    }

    pub fn execute(&self, name: &str, hold: Duration) -> Result<()> {
        let registry = build_registry(self.config, self.dummy)?;
        let relay = registry
            .get_relay_by_name(name)?
            .ok_or_else(|| RelayError::InvalidArgument(format!("Relay '{name}' not found")))?;

        if !relay.open()? {
            return Err(RelayError::SystemError(format!(
                "Relay '{name}' could not be opened"
            )));
        }
        println!("Opened {name}");

        if !hold.is_zero() {
            info!("Holding {name} for {} ms", hold.as_millis());
            thread::sleep(hold);
        }

        relay.close()?;
        println!("Closed {name}");
        Ok(())
    }
}
