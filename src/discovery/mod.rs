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

//! Device enumeration and hot-plug tracking.
//!
//! The first call to [`DiscoveryService::get_relays`] enumerates the driver on
//! a separate thread under a timeout and keeps the resulting handles as the
//! snapshot. Drivers with discovery support are then re-scanned periodically;
//! every scan diffs the fresh enumeration against the snapshot by device name
//! and reports the difference to discovery listeners.

mod event;

pub use event::{DiscoveryEvent, DiscoveryEventType, DiscoveryListener};

use crate::cancellation::CancellationToken;
use crate::driver::{RelayDevice, RelayDriver};
use crate::error::{RelayError, Result};
use crate::relay::{ListenerSet, Relay, RelayContext, notify_all};
use crate::shutdown::Deallocator;
use crate::worker::spawn_worker;
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

const DISCOVERY_THREAD_NAME: &str = "relay-discovery-service";

type Snapshot = Option<Vec<Relay>>;

/// Discovery of the relays exposed by one driver.
pub struct DiscoveryService {
    inner: Arc<DiscoveryInner>,
}

struct DiscoveryInner {
    driver: Arc<dyn RelayDriver>,
    thread_safe: bool,
    scan_capable: bool,
    context: Arc<RelayContext>,
    listeners: Arc<ListenerSet<dyn DiscoveryListener>>,
    deallocator: Mutex<Option<Arc<Deallocator>>>,
    snapshot: Mutex<Snapshot>,
    running: AtomicBool,
    enabled: AtomicBool,
    runner: Mutex<Option<Runner>>,
}

struct Runner {
    stop: Sender<()>,
    handle: JoinHandle<()>,
    thread: ThreadId,
}

impl DiscoveryService {
    pub fn new(
        driver: Arc<dyn RelayDriver>,
        context: Arc<RelayContext>,
        listeners: Arc<ListenerSet<dyn DiscoveryListener>>,
    ) -> Self {
        let thread_safe = driver.is_thread_safe();
        let scan_capable = driver.as_discovery().is_some();
        Self {
            inner: Arc::new(DiscoveryInner {
                driver,
                thread_safe,
                scan_capable,
                context,
                listeners,
                deallocator: Mutex::new(None),
                snapshot: Mutex::new(None),
                running: AtomicBool::new(false),
                enabled: AtomicBool::new(true),
                runner: Mutex::new(None),
            }),
        }
    }

    /// Tracks the snapshot in `deallocator` so it can be disposed on SIGTERM.
    ///
    /// The current snapshot is stored right away and every later topology
    /// change replaces it. `None` detaches and clears the previous one.
    pub fn set_deallocator(&self, deallocator: Option<Arc<Deallocator>>) {
        let snapshot = self.inner.snapshot();
        let mut slot = self.inner.deallocator_slot();
        if let Some(previous) = slot.take() {
            previous.unstore();
        }
        if let Some(deallocator) = &deallocator {
            deallocator.store(snapshot.as_deref().unwrap_or_default());
        }
        *slot = deallocator;
    }

    pub fn has_deallocator(&self) -> bool {
        self.inner.deallocator_slot().is_some()
    }

    pub fn driver(&self) -> &Arc<dyn RelayDriver> {
        &self.inner.driver
    }

    /// Known relays, enumerating the driver first if nothing is known yet.
    ///
    /// The first enumeration runs on a separate thread; if it takes longer
    /// than `timeout` it is abandoned and [`RelayError::DiscoveryTimeout`] is
    /// returned. Concurrent callers wait for the same enumeration.
    pub fn get_relays(&self, timeout: Duration) -> Result<Vec<Relay>> {
        self.inner.get_relays(timeout)
    }

    /// Re-enumerates the driver and reports added and removed relays.
    pub fn scan(&self) -> Result<()> {
        self.inner.scan()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Starts the periodic scan loop.
    ///
    /// Does nothing when disabled, when the driver cannot rescan or when the
    /// loop already runs.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;

        if !self.is_enabled() {
            info!("Discovery service has been disabled and thus it will not be started");
            return Ok(());
        }

        if !inner.scan_capable {
            info!(
                "Discovery will not run - driver {} does not support this feature",
                inner.driver.label()
            );
            return Ok(());
        }

        if inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        let (stop, stopped) = mpsc::channel::<()>();
        let looped = Arc::clone(inner);
        let spawned = spawn_worker(DISCOVERY_THREAD_NAME.to_string(), move || {
            looped.run(stopped)
        });
        match spawned {
            Ok(handle) => {
                let thread = handle.thread().id();
                *inner.runner() = Some(Runner {
                    stop,
                    handle,
                    thread,
                });
                debug!("Discovery service has been started");
                Ok(())
            }
            Err(err) => {
                inner.running.store(false, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    /// Stops the scan loop and waits for it to finish.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Stops scanning, disposes every known relay and forgets the snapshot.
    pub fn shutdown(&self) {
        self.inner.stop();

        let relays = self.inner.snapshot().take().unwrap_or_default();
        for relay in &relays {
            if let Err(err) = relay.dispose() {
                warn!("Failed to dispose {relay} during discovery shutdown: {err}");
            }
        }

        if let Some(deallocator) = self.inner.deallocator_slot().as_ref() {
            deallocator.unstore();
        }
        debug!("Discovery service has been shut down");
    }
}

impl DiscoveryInner {
    fn get_relays(&self, timeout: Duration) -> Result<Vec<Relay>> {
        let (relays, fresh) = {
            let mut snapshot = self.snapshot();
            match &*snapshot {
                Some(relays) => (relays.clone(), false),
                None => {
                    let relays = self.enumerate(timeout)?;
                    self.track(&relays);
                    *snapshot = Some(relays.clone());
                    (relays, true)
                }
            }
        };

        if fresh {
            let listeners = self.listeners.snapshot();
            for relay in &relays {
                notify_found(&listeners, relay);
            }
        }
        Ok(relays)
    }

    fn enumerate(&self, timeout: Duration) -> Result<Vec<Relay>> {
        let token = CancellationToken::new();
        let (sender, outcome) = mpsc::sync_channel(1);
        let driver = Arc::clone(&self.driver);
        let observer = token.clone();

        spawn_worker(DISCOVERY_THREAD_NAME.to_string(), move || {
            let devices = driver.devices();
            if observer.is_cancelled() {
                debug!("Discarding relay enumeration that finished after the timeout");
                return;
            }
            let _ = sender.send(devices);
        })?;

        match outcome.recv_timeout(timeout) {
            Ok(devices) => Ok(self.wrap(devices?)),
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                Err(RelayError::DiscoveryTimeout {
                    timeout_ms: timeout.as_millis(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(RelayError::Driver(format!(
                "Driver {} failed to enumerate devices",
                self.driver.label()
            ))),
        }
    }

    fn scan(&self) -> Result<()> {
        // Makes sure the initial snapshot exists before diffing against it.
        self.get_relays(Duration::MAX)?;

        let devices = self.driver.devices()?;
        let listeners = self.listeners.snapshot();

        let (gone, found) = {
            let mut snapshot = self.snapshot();
            let previous = snapshot.clone().unwrap_or_default();

            let mut current = Vec::with_capacity(devices.len());
            let mut found = Vec::new();
            for device in devices {
                let name = device.name();
                let known = previous
                    .iter()
                    .find(|relay| !relay.is_disposed() && relay.name() == name);
                match known {
                    Some(relay) => current.push(relay.clone()),
                    None => {
                        let relay = self.wrap_one(device);
                        found.push(relay.clone());
                        current.push(relay);
                    }
                }
            }

            let gone: Vec<Relay> = previous
                .into_iter()
                .filter(|relay| !current.iter().any(|kept| kept.ptr_eq(relay)))
                .collect();

            if !gone.is_empty() || !found.is_empty() {
                self.track(&current);
                *snapshot = Some(current);
            }
            (gone, found)
        };

        for relay in &gone {
            if let Err(err) = relay.dispose() {
                error!("Failed to dispose removed {relay}: {err}");
            }
            notify_gone(&listeners, relay);
        }
        for relay in &found {
            notify_found(&listeners, relay);
        }

        if !gone.is_empty() || !found.is_empty() {
            debug!(
                "Relay scan: {} added, {} removed",
                found.len(),
                gone.len()
            );
        }
        Ok(())
    }

    fn run(&self, stopped: Receiver<()>) {
        let Some(support) = self.driver.as_discovery() else {
            return;
        };
        if !support.is_scan_possible() {
            debug!("Relay scan is not possible for {}", self.driver.label());
            return;
        }

        loop {
            match stopped.recv_timeout(support.scan_interval()) {
                Err(RecvTimeoutError::Timeout) => {}
                _ => break,
            }
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            if let Err(err) = self.scan() {
                warn!("Relay discovery scan failed: {err}");
            }
        }

        debug!("Relay discovery service loop has been stopped");
    }

    fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let runner = self.runner().take();
        if let Some(Runner {
            stop,
            handle,
            thread,
        }) = runner
        {
            let _ = stop.send(());
            drop(stop);
            if thread != thread::current().id() && handle.join().is_err() {
                debug!("Discovery loop terminated abnormally");
            }
        }
        debug!("Discovery service has been stopped");
    }

    fn wrap(&self, devices: Vec<Arc<dyn RelayDevice>>) -> Vec<Relay> {
        devices
            .into_iter()
            .map(|device| self.wrap_one(device))
            .collect()
    }

    fn wrap_one(&self, device: Arc<dyn RelayDevice>) -> Relay {
        Relay::new(device, self.thread_safe, Arc::clone(&self.context))
    }

    fn track(&self, relays: &[Relay]) {
        if let Some(deallocator) = self.deallocator_slot().as_ref() {
            deallocator.store(relays);
        }
    }

    fn deallocator_slot(&self) -> MutexGuard<'_, Option<Arc<Deallocator>>> {
        self.deallocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> MutexGuard<'_, Snapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn runner(&self) -> MutexGuard<'_, Option<Runner>> {
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn notify_found(listeners: &[Arc<dyn DiscoveryListener>], relay: &Relay) {
    let event = DiscoveryEvent::new(DiscoveryEventType::Added, relay.clone());
    notify_all(listeners, "relay found", |listener| {
        listener.relay_found(&event)
    });
}

fn notify_gone(listeners: &[Arc<dyn DiscoveryListener>], relay: &Relay) {
    let event = DiscoveryEvent::new(DiscoveryEventType::Removed, relay.clone());
    notify_all(listeners, "relay gone", |listener| listener.relay_gone(&event));
}

impl Drop for DiscoveryService {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl std::fmt::Debug for DiscoveryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryService")
            .field("driver", &self.inner.driver.label())
            .field("running", &self.is_running())
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Journal {
        entries: Mutex<Vec<(DiscoveryEventType, String)>>,
    }

    impl Journal {
        fn entries(&self) -> Vec<(DiscoveryEventType, String)> {
            self.entries.lock().unwrap().clone()
        }

        fn push(&self, event: &DiscoveryEvent) -> Result<()> {
            self.entries
                .lock()
                .unwrap()
                .push((event.kind(), event.relay().name()));
            Ok(())
        }
    }

    impl DiscoveryListener for Journal {
        fn relay_found(&self, event: &DiscoveryEvent) -> Result<()> {
            self.push(event)
        }

        fn relay_gone(&self, event: &DiscoveryEvent) -> Result<()> {
            self.push(event)
        }
    }

    struct SlowDriver;

    impl RelayDriver for SlowDriver {
        fn devices(&self) -> Result<Vec<Arc<dyn RelayDevice>>> {
            thread::sleep(Duration::from_millis(300));
            Ok(Vec::new())
        }

        fn is_thread_safe(&self) -> bool {
            true
        }
    }

    fn service(temp: &TempDir, driver: Arc<dyn RelayDriver>) -> (DiscoveryService, Arc<Journal>) {
        let context = Arc::new(RelayContext::new(temp.path().to_path_buf()));
        let listeners: Arc<ListenerSet<dyn DiscoveryListener>> = Arc::new(ListenerSet::new());
        let journal = Arc::new(Journal::default());
        listeners.add(journal.clone());
        (DiscoveryService::new(driver, context, listeners), journal)
    }

    #[test]
    fn first_enumeration_emits_found_once() {
        let temp = TempDir::new().unwrap();
        let (service, journal) = service(&temp, Arc::new(DummyDriver::new(2)));

        let first = service.get_relays(Duration::from_secs(5)).unwrap();
        let second = service.get_relays(Duration::from_secs(5)).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first[0].ptr_eq(&second[0]));
        assert_eq!(
            journal.entries(),
            vec![
                (DiscoveryEventType::Added, "Dummy-0".to_string()),
                (DiscoveryEventType::Added, "Dummy-1".to_string()),
            ]
        );
    }

    #[test]
    fn slow_enumeration_times_out() {
        let temp = TempDir::new().unwrap();
        let (service, _journal) = service(&temp, Arc::new(SlowDriver));

        let err = service.get_relays(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, RelayError::DiscoveryTimeout { timeout_ms: 20 }));
        assert!(service.get_relays(Duration::from_secs(5)).unwrap().is_empty());
    }

    #[test]
    fn scan_reports_difference_by_name() {
        let temp = TempDir::new().unwrap();
        let driver = Arc::new(DummyDriver::empty());
        for name in ["A", "B", "C"] {
            driver.plug(name);
        }
        let (service, journal) = service(&temp, driver.clone());
        let before = service.get_relays(Duration::from_secs(5)).unwrap();

        driver.unplug("A");
        driver.plug("D");
        service.scan().unwrap();

        let entries = journal.entries();
        assert_eq!(
            entries[3..].to_vec(),
            vec![
                (DiscoveryEventType::Removed, "A".to_string()),
                (DiscoveryEventType::Added, "D".to_string()),
            ]
        );

        let after = service.get_relays(Duration::from_secs(5)).unwrap();
        let names: Vec<String> = after.iter().map(Relay::name).collect();
        assert_eq!(names, vec!["B", "C", "D"]);
        assert!(before[0].is_disposed());
        assert!(after[0].ptr_eq(&before[1]));
        assert_eq!(driver.device("B").unwrap().dispose_calls(), 0);
    }

    #[test]
    fn unchanged_scan_is_silent() {
        let temp = TempDir::new().unwrap();
        let (service, journal) = service(&temp, Arc::new(DummyDriver::new(3)));
        service.get_relays(Duration::from_secs(5)).unwrap();
        service.scan().unwrap();
        assert_eq!(journal.entries().len(), 3);
    }

    #[test]
    fn start_requires_discovery_support() {
        let temp = TempDir::new().unwrap();
        let (plain, _journal) = service(&temp, Arc::new(SlowDriver));
        plain.start().unwrap();
        assert!(!plain.is_running());

        let (capable, _journal) = service(&temp, Arc::new(DummyDriver::new(1)));
        capable.set_enabled(false);
        capable.start().unwrap();
        assert!(!capable.is_running());

        capable.set_enabled(true);
        capable.start().unwrap();
        assert!(capable.is_running());
        capable.stop();
        assert!(!capable.is_running());
    }

    #[test]
    fn loop_picks_up_hot_plug() {
        let temp = TempDir::new().unwrap();
        let driver = Arc::new(DummyDriver::new(1).with_scan_interval(Duration::from_millis(20)));
        let (service, journal) = service(&temp, driver.clone());
        service.get_relays(Duration::from_secs(5)).unwrap();
        service.start().unwrap();

        driver.plug("late");
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while journal.entries().len() < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        service.stop();

        assert_eq!(
            journal.entries().last().cloned(),
            Some((DiscoveryEventType::Added, "late".to_string()))
        );
    }

    #[test]
    fn shutdown_disposes_and_forgets() {
        let temp = TempDir::new().unwrap();
        let (service, _journal) = service(&temp, Arc::new(DummyDriver::new(2)));
        let relays = service.get_relays(Duration::from_secs(5)).unwrap();
        relays[0].open().unwrap();

        service.shutdown();
        assert!(relays.iter().all(Relay::is_disposed));

        let again = service.get_relays(Duration::from_secs(5)).unwrap();
        assert_eq!(again.len(), 2);
        assert!(!again[0].ptr_eq(&relays[0]));
    }
}
