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

pub mod list;
pub mod locks;
pub mod open;
pub mod watch;

use crate::config::RelayConfig;
use crate::driver::{DriverCandidate, DummyDriver, RelayDriver};
use crate::error::Result;
use crate::registry::RelayRegistry;
use std::sync::Arc;

/// Name under which the built-in dummy driver is registered.
pub const DUMMY_DRIVER: &str = "dummy";

/// Builds a registry for CLI use.
///
/// With `dummy` set, a dummy driver with that many devices is used. Otherwise
/// the dummy driver is only registered as a candidate, so a configured driver
/// name decides.
pub fn build_registry(config: &RelayConfig, dummy: Option<usize>) -> Result<RelayRegistry> {
    let registry = RelayRegistry::from_config(config)?;
    match dummy {
        Some(count) => registry.set_driver(Arc::new(DummyDriver::new(count))),
        None => registry.register_driver(DriverCandidate::new(DUMMY_DRIVER, || {
            Ok(Arc::new(DummyDriver::empty()) as Arc<dyn RelayDriver>)
        })),
    }
    Ok(registry)
}
