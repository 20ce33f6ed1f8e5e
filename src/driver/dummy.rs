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

//! In-memory driver used as the no-op fallback and in tests.

use crate::driver::{Configurable, DiscoverySupport, Parameters, RelayDevice, RelayDriver};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(10);

/// Device that only tracks its own state and counts calls.
#[derive(Debug)]
pub struct DummyDevice {
    name: String,
    open: AtomicBool,
    open_calls: AtomicUsize,
    close_calls: AtomicUsize,
    dispose_calls: AtomicUsize,
    parameters: Mutex<Parameters>,
}

impl DummyDevice {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            open: AtomicBool::new(false),
            open_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            dispose_calls: AtomicUsize::new(0),
            parameters: Mutex::new(Parameters::new()),
        }
    }

    pub fn numbered(number: usize) -> Self {
        Self::new(format!("Dummy-{number}"))
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn dispose_calls(&self) -> usize {
        self.dispose_calls.load(Ordering::SeqCst)
    }

    pub fn parameters(&self) -> Parameters {
        self.parameters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RelayDevice for DummyDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&self) -> Result<()> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        self.dispose_calls.fetch_add(1, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn as_configurable(&self) -> Option<&dyn Configurable> {
        Some(self)
    }
}

impl Configurable for DummyDevice {
    fn set_parameters(&self, parameters: &Parameters) -> Result<()> {
        let mut current = self
            .parameters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        current.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

/// Driver exposing a mutable set of [`DummyDevice`]s.
///
/// Device instances are stable across enumerations so their state and call
/// counters survive rescans. Devices can be plugged and unplugged at runtime
/// to simulate hot-plug.
#[derive(Debug)]
pub struct DummyDriver {
    devices: Mutex<Vec<Arc<DummyDevice>>>,
    thread_safe: bool,
    scan_interval: Duration,
    scan_possible: AtomicBool,
}

impl DummyDriver {
    pub fn new(count: usize) -> Self {
        let devices = (0..count).map(|i| Arc::new(DummyDevice::numbered(i))).collect();
        Self {
            devices: Mutex::new(devices),
            thread_safe: false,
            scan_interval: DEFAULT_SCAN_INTERVAL,
            scan_possible: AtomicBool::new(true),
        }
    }

    /// Driver without any devices, used when no other driver resolves.
    pub fn empty() -> Self {
        Self::new(0)
    }

    pub fn with_thread_safe(mut self, thread_safe: bool) -> Self {
        self.thread_safe = thread_safe;
        self
    }

    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    pub fn set_scan_possible(&self, possible: bool) {
        self.scan_possible.store(possible, Ordering::SeqCst);
    }

    /// Adds a device, returning the existing one if the name is taken.
    pub fn plug(&self, name: &str) -> Arc<DummyDevice> {
        let mut devices = self.lock_devices();
        if let Some(existing) = devices.iter().find(|d| d.name == name) {
            return existing.clone();
        }
        let device = Arc::new(DummyDevice::new(name));
        devices.push(device.clone());
        device
    }

    /// Removes a device by name; returns whether it was present.
    pub fn unplug(&self, name: &str) -> bool {
        let mut devices = self.lock_devices();
        let before = devices.len();
        devices.retain(|d| d.name != name);
        devices.len() != before
    }

    pub fn device(&self, name: &str) -> Option<Arc<DummyDevice>> {
        self.lock_devices().iter().find(|d| d.name == name).cloned()
    }

    fn lock_devices(&self) -> std::sync::MutexGuard<'_, Vec<Arc<DummyDevice>>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RelayDriver for DummyDriver {
    fn devices(&self) -> Result<Vec<Arc<dyn RelayDevice>>> {
        Ok(self
            .lock_devices()
            .iter()
            .map(|d| d.clone() as Arc<dyn RelayDevice>)
            .collect())
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    fn as_discovery(&self) -> Option<&dyn DiscoverySupport> {
        Some(self)
    }
}

impl DiscoverySupport for DummyDriver {
    fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    fn is_scan_possible(&self) -> bool {
        self.scan_possible.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_devices_are_named_sequentially() {
        let driver = DummyDriver::new(3);
        let names: Vec<String> = driver
            .devices()
            .unwrap()
            .iter()
            .map(|d| d.name())
            .collect();
        assert_eq!(names, vec!["Dummy-0", "Dummy-1", "Dummy-2"]);
        assert!(!driver.is_thread_safe());
        assert_eq!(driver.label(), "DummyDriver");
    }

    #[test]
    fn enumeration_returns_stable_instances() {
        let driver = DummyDriver::new(1);
        let first = driver.devices().unwrap();
        first[0].open().unwrap();
        let second = driver.devices().unwrap();
        assert!(second[0].is_open());
        assert_eq!(driver.device("Dummy-0").unwrap().open_calls(), 1);
    }

    #[test]
    fn plug_and_unplug() {
        let driver = DummyDriver::empty();
        driver.plug("A");
        driver.plug("A");
        driver.plug("B");
        assert_eq!(driver.devices().unwrap().len(), 2);
        assert!(driver.unplug("A"));
        assert!(!driver.unplug("A"));
        assert_eq!(driver.devices().unwrap()[0].name(), "B");
    }

    #[test]
    fn discovery_capability_is_advertised() {
        let driver = DummyDriver::new(0).with_scan_interval(Duration::from_millis(50));
        let support = driver.as_discovery().unwrap();
        assert_eq!(support.scan_interval(), Duration::from_millis(50));
        assert!(support.is_scan_possible());
        driver.set_scan_possible(false);
        assert!(!support.is_scan_possible());
    }

    #[test]
    fn parameters_are_merged() {
        let device = DummyDevice::new("cfg");
        let mut params = Parameters::new();
        params.insert("channels".to_string(), serde_json::json!(2));
        device
            .as_configurable()
            .unwrap()
            .set_parameters(&params)
            .unwrap();
        assert_eq!(device.parameters()["channels"], serde_json::json!(2));
    }
}
