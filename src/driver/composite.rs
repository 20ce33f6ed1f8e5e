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

use crate::driver::{DiscoverySupport, RelayDevice, RelayDriver};
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Driver aggregating the devices of several drivers.
#[derive(Default)]
pub struct CompositeDriver {
    drivers: Vec<Arc<dyn RelayDriver>>,
}

impl CompositeDriver {
    pub fn new(drivers: Vec<Arc<dyn RelayDriver>>) -> Self {
        Self { drivers }
    }

    pub fn add(&mut self, driver: Arc<dyn RelayDriver>) {
        self.drivers.push(driver);
    }

    pub fn drivers(&self) -> &[Arc<dyn RelayDriver>] {
        &self.drivers
    }

    fn discovering(&self) -> impl Iterator<Item = &dyn DiscoverySupport> {
        self.drivers.iter().filter_map(|d| d.as_discovery())
    }
}

impl RelayDriver for CompositeDriver {
    fn devices(&self) -> Result<Vec<Arc<dyn RelayDevice>>> {
        let mut all = Vec::new();
        for driver in &self.drivers {
            all.extend(driver.devices()?);
        }
        Ok(all)
    }

    /// Thread-safe only when every member is.
    fn is_thread_safe(&self) -> bool {
        self.drivers.iter().all(|d| d.is_thread_safe())
    }

    fn as_discovery(&self) -> Option<&dyn DiscoverySupport> {
        if self.discovering().next().is_some() {
            Some(self)
        } else {
            None
        }
    }
}

impl DiscoverySupport for CompositeDriver {
    /// Shortest interval among members able to scan right now, or among
    /// all discovering members when none is.
    fn scan_interval(&self) -> Duration {
        self.discovering()
            .filter(|s| s.is_scan_possible())
            .map(|s| s.scan_interval())
            .min()
            .or_else(|| self.discovering().map(|s| s.scan_interval()).min())
            .unwrap_or(Duration::MAX)
    }

    fn is_scan_possible(&self) -> bool {
        self.discovering().any(|s| s.is_scan_possible())
    }
}
