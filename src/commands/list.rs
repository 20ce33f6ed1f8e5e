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
use crate::error::Result;
use crate::relay::Relay;
use log::debug;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct RelaySummary {
    pub name: String,
    pub open: bool,
    pub locked: bool,
}

impl RelaySummary {
    fn of(relay: &Relay) -> Result<Self> {
        Ok(Self {
            name: relay.name(),
            open: relay.is_open(),
            locked: relay.lock().is_locked()?,
        })
    }
}

pub struct ListCommand<'a> {
    config: &'a RelayConfig,
    dummy: Option<usize>,
}

impl<'a> ListCommand<'a> {
    pub fn new(config: &'a RelayConfig, dummy: Option<usize>) -> Result<Self> {
        Ok(Self { config, dummy })
    }

    pub fn summaries(&self) -> Result<Vec<RelaySummary>> {
        let registry = build_registry(self.config, self.dummy)?;
        let relays = registry.get_relays()?;
        debug!("Discovered {} relay(s)", relays.len());
        relays.iter().map(RelaySummary::of).collect()
    }

    pub fn execute(&self, json: bool) -> Result<()> {
        let summaries = self.summaries()?;

        if json {
            println!("{}", serde_json::to_string_pretty(&summaries)?);
            return Ok(());
        }

        if summaries.is_empty() {
            println!("No relays detected");
            return Ok(());
        }

        for summary in &summaries {
            let marker = if summary.locked { " (locked)" } else { "" };
            println!("{}{marker}", summary.name);
        }
        Ok(())
    }
}
