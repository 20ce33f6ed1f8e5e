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
use crate::discovery::{DiscoveryEvent, DiscoveryListener};
use crate::error::Result;
use chrono::Local;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct PrintingListener;

impl PrintingListener {
    fn print(sign: char, event: &DiscoveryEvent) {
        println!(
            "{} {sign} {}",
            Local::now().format("%H:%M:%S"),
            event.relay().name()
        );
    }
}

impl DiscoveryListener for PrintingListener {
    fn relay_found(&self, event: &DiscoveryEvent) -> Result<()> {
        Self::print('+', event);
        Ok(())
    }

    fn relay_gone(&self, event: &DiscoveryEvent) -> Result<()> {
        Self::print('-', event);
        Ok(())
    }
}

/// Prints topology changes reported by discovery for a while.
pub struct WatchCommand<'a> {
    config: &'a RelayConfig,
    dummy: Option<usize>,
}

impl<'a> WatchCommand<'a> {
    pub fn new(config: &'a RelayConfig, dummy: Option<usize>) -> Result<Self> {
        Ok(Self { config, dummy })
    }

    pub fn execute(&self, duration: Duration) -> Result<()> {
        let registry = build_registry(self.config, self.dummy)?;
        registry.add_discovery_listener(Arc::new(PrintingListener));

        let relays = registry.get_relays()?;
        println!("Watching {} relay(s) for {} s", relays.len(), duration.as_secs());

        thread::sleep(duration);
        registry.shutdown();
        Ok(())
    }
}
