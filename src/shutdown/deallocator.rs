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

//! Disposal of tracked relays on SIGTERM.
//!
//! Once installed, a listener thread waits for SIGTERM, disposes every stored
//! relay and then re-raises the signal with its default disposition, so the
//! process still terminates the usual way.

use crate::error::Result;
use crate::relay::Relay;
use log::{error, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

type Stored = Arc<Mutex<Vec<Relay>>>;

pub struct Deallocator {
    relays: Stored,
    #[cfg(unix)]
    signals: Option<signal_hook::iterator::Handle>,
    listener: Option<JoinHandle<()>>,
}

impl Deallocator {
    /// Creates a deallocator with nothing stored and no signal handler.
    pub fn detached() -> Self {
        Self {
            relays: Arc::new(Mutex::new(Vec::new())),
            #[cfg(unix)]
            signals: None,
            listener: None,
        }
    }

    /// Creates a deallocator and starts listening for SIGTERM.
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        use crate::worker::spawn_worker;
        use signal_hook::consts::signal::SIGTERM;
        use signal_hook::iterator::Signals;

        warn!("Automated deallocation on TERM signal is now enabled! Make sure to not use it in production!");

        let mut signals = Signals::new([SIGTERM])?;
        let handle = signals.handle();
        let relays: Stored = Arc::new(Mutex::new(Vec::new()));
        let stored = Arc::clone(&relays);

        let listener = spawn_worker("relay-signal-handler".to_string(), move || {
            for signal in signals.forever() {
                warn!("Detected signal TERM ({signal}), calling deallocator");
                deallocate(&stored);
                if let Err(err) = signal_hook::low_level::emulate_default_handler(signal) {
                    error!("Failed to continue default handling of signal {signal}: {err}");
                }
            }
        })?;

        Ok(Self {
            relays,
            signals: Some(handle),
            listener: Some(listener),
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        warn!("Deallocation on TERM signal is not supported on this platform");
        Ok(Self::detached())
    }

    /// Replaces the tracked relays.
    pub fn store(&self, relays: &[Relay]) {
        *self.stored() = relays.to_vec();
    }

    pub fn unstore(&self) {
        self.stored().clear();
    }

    pub fn stored_count(&self) -> usize {
        self.stored().len()
    }

    /// Disposes every tracked relay. Returns how many were disposed cleanly.
    pub fn deallocate(&self) -> usize {
        deallocate(&self.relays)
    }

    fn stored(&self) -> MutexGuard<'_, Vec<Relay>> {
        self.relays.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn deallocate(relays: &Stored) -> usize {
    let relays = relays
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let mut disposed = 0;
    for relay in relays {
        match relay.dispose() {
            Ok(()) => disposed += 1,
            Err(err) => error!("Failed to deallocate {relay}: {err}"),
        }
    }
    disposed
}

impl Drop for Deallocator {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let Some(signals) = self.signals.take() {
            signals.close();
        }
        if let Some(listener) = self.listener.take() {
            let _ = listener.join();
        }
    }
}

impl std::fmt::Debug for Deallocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deallocator")
            .field("stored", &self.stored_count())
            .field("listening", &self.listener.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DummyDevice;
    use crate::relay::RelayContext;
    use serial_test::serial;
    use tempfile::TempDir;

    fn relays(temp: &TempDir, count: usize) -> Vec<Relay> {
        let context = Arc::new(RelayContext::new(temp.path().to_path_buf()));
        (0..count)
            .map(|i| Relay::new(Arc::new(DummyDevice::numbered(i)), true, context.clone()))
            .collect()
    }

    #[test]
    fn deallocate_disposes_stored_relays() {
        let temp = TempDir::new().unwrap();
        let relays = relays(&temp, 3);
        relays[0].open().unwrap();

        let deallocator = Deallocator::detached();
        deallocator.store(&relays);
        assert_eq!(deallocator.stored_count(), 3);
        assert_eq!(deallocator.deallocate(), 3);
        assert!(relays.iter().all(Relay::is_disposed));
    }

    #[test]
    fn unstore_forgets_relays() {
        let temp = TempDir::new().unwrap();
        let relays = relays(&temp, 2);
        let deallocator = Deallocator::detached();
        deallocator.store(&relays);
        deallocator.unstore();
        assert_eq!(deallocator.deallocate(), 0);
        assert!(!relays[0].is_disposed());
    }

    #[test]
    #[serial]
    fn installed_deallocator_shuts_down_cleanly() {
        let deallocator = Deallocator::install().unwrap();
        deallocator.store(&[]);
        drop(deallocator);
    }
}
