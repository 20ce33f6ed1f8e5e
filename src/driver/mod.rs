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

//! Capability interfaces implemented by relay drivers.
//!
//! A driver enumerates devices of one transport family. The framework never
//! talks to hardware itself; it only calls these traits. Optional capabilities
//! (discovery, configuration) are negotiated through the `as_*` accessors,
//! which return `None` unless the implementor opts in.

pub mod catalog;
pub mod composite;
pub mod dummy;

pub use catalog::{DriverCandidate, DriverCatalog, DriverFactory};
pub use composite::CompositeDriver;
pub use dummy::{DummyDevice, DummyDriver};

use crate::error::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Device-specific settings keyed by parameter name.
pub type Parameters = BTreeMap<String, serde_json::Value>;

/// A single relay device exposed by a driver.
///
/// Devices are shared between the discovery snapshot, handles and worker
/// threads, so implementations use interior mutability.
pub trait RelayDevice: Send + Sync {
    /// Name used as the device identity. Must be unique within the process.
    fn name(&self) -> String;

    fn open(&self) -> Result<()>;

    /// Close the device; it can be opened again later.
    fn close(&self) -> Result<()>;

    /// Release the device for good. It is never opened again afterwards.
    fn dispose(&self) -> Result<()>;

    fn is_open(&self) -> bool;

    /// Configuration capability, for devices that accept parameters.
    fn as_configurable(&self) -> Option<&dyn Configurable> {
        None
    }
}

/// Implemented by devices that accept driver-specific parameters.
pub trait Configurable {
    fn set_parameters(&self, parameters: &Parameters) -> Result<()>;
}

/// Implemented by drivers able to rescan for devices periodically.
pub trait DiscoverySupport: Send + Sync {
    fn scan_interval(&self) -> Duration;

    fn is_scan_possible(&self) -> bool;
}

/// Factory for relay devices of one transport family.
pub trait RelayDriver: Send + Sync {
    fn devices(&self) -> Result<Vec<Arc<dyn RelayDevice>>>;

    /// Whether device calls may run concurrently. Drivers returning `false`
    /// have every open/close/dispose funnelled through the task processor.
    fn is_thread_safe(&self) -> bool;

    fn as_discovery(&self) -> Option<&dyn DiscoverySupport> {
        None
    }

    fn label(&self) -> String {
        let full = std::any::type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full).to_string()
    }
}
