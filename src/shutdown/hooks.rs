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

use crate::error::{RelayError, Result};
use crate::relay::{Relay, RelayInner};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, Weak};

pub type HookId = u64;

#[derive(Default)]
struct HookTable {
    closed: bool,
    next_id: HookId,
    relays: BTreeMap<HookId, Weak<RelayInner>>,
}

/// Exit hooks disposing relays that are still open at shutdown.
///
/// Hooks hold weak references, so a registered relay that is dropped
/// elsewhere is simply skipped.
#[derive(Default)]
pub struct ShutdownHooks {
    table: Mutex<HookTable>,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `relay`. Fails once the hooks have started running.
    pub(crate) fn add(&self, relay: &Relay) -> Result<HookId> {
        let mut table = self.table();
        if table.closed {
            return Err(RelayError::SystemError(
                "Shutdown in progress, cannot register exit hook".to_string(),
            ));
        }
        table.next_id += 1;
        let id = table.next_id;
        table.relays.insert(id, relay.downgrade());
        Ok(id)
    }

    pub(crate) fn remove(&self, id: HookId) -> bool {
        self.table().relays.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.table().relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.table().closed
    }

    /// Disposes every registered relay. Returns how many were disposed.
    pub fn run(&self) -> usize {
        let relays = {
            let mut table = self.table();
            table.closed = true;
            std::mem::take(&mut table.relays)
        };

        let mut disposed = 0;
        for relay in relays.into_values().filter_map(|weak| weak.upgrade()) {
            let relay = Relay::from_inner(relay);
            info!("Automatic {} deallocation", relay.name());
            match relay.dispose() {
                Ok(()) => disposed += 1,
                Err(err) => warn!("Automatic deallocation of {relay} failed: {err}"),
            }
        }
        disposed
    }

    fn table(&self) -> MutexGuard<'_, HookTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table();
        f.debug_struct("ShutdownHooks")
            .field("closed", &table.closed)
            .field("registered", &table.relays.len())
            .finish()
    }
}
