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

use crate::error::Result;
use crate::relay::Relay;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryEventType {
    Added,
    Removed,
}

/// A relay appeared in or disappeared from the driver's enumeration.
#[derive(Debug, Clone)]
pub struct DiscoveryEvent {
    kind: DiscoveryEventType,
    relay: Relay,
}

impl DiscoveryEvent {
    pub fn new(kind: DiscoveryEventType, relay: Relay) -> Self {
        Self { kind, relay }
    }

    pub fn kind(&self) -> DiscoveryEventType {
        self.kind
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }
}

/// Observer of topology changes.
pub trait DiscoveryListener: Send + Sync {
    fn relay_found(&self, _event: &DiscoveryEvent) -> Result<()> {
        Ok(())
    }

    fn relay_gone(&self, _event: &DiscoveryEvent) -> Result<()> {
        Ok(())
    }
}
