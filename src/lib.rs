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

pub mod cancellation;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod locking;
pub mod logging;
pub mod processor;
pub mod registry;
pub mod relay;
pub mod shutdown;
mod worker;

pub use discovery::{DiscoveryEvent, DiscoveryEventType, DiscoveryListener, DiscoveryService};
pub use driver::{Configurable, DiscoverySupport, Parameters, RelayDevice, RelayDriver};
pub use error::{RelayError, Result};
pub use registry::RelayRegistry;
pub use relay::{Relay, RelayContext, RelayEvent, RelayEventType, RelayListener};
