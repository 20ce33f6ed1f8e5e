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

use crate::config::RelayConfig;
use crate::driver::Parameters;
use crate::error::Result;
use crate::processor::TaskProcessor;
use crate::shutdown::ShutdownHooks;
use log::debug;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared by every handle created under one registry.
#[derive(Debug)]
pub struct RelayContext {
    processor: TaskProcessor,
    hooks: ShutdownHooks,
    auto_open: AtomicBool,
    lock_dir: PathBuf,
    locking_enabled: bool,
    device_parameters: BTreeMap<String, Parameters>,
}

impl RelayContext {
    pub fn new(lock_dir: PathBuf) -> Self {
        Self {
            processor: TaskProcessor::new(DEFAULT_SHUTDOWN_TIMEOUT),
            hooks: ShutdownHooks::new(),
            auto_open: AtomicBool::new(false),
            lock_dir,
            locking_enabled: true,
            device_parameters: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let mut device_parameters = BTreeMap::new();
        for (name, device) in &config.devices {
            device_parameters.insert(name.clone(), device.parameters()?);
        }
        debug!(
            "Relay context: lock directory {}, locking {}, {} configured device(s)",
            config.lock.directory().display(),
            if config.lock.enabled { "on" } else { "off" },
            device_parameters.len()
        );

        Ok(Self {
            processor: TaskProcessor::new(config.processor.shutdown_timeout()),
            hooks: ShutdownHooks::new(),
            auto_open: AtomicBool::new(config.auto_open),
            lock_dir: config.lock.directory(),
            locking_enabled: config.lock.enabled,
            device_parameters,
        })
    }

    pub fn with_locking(mut self, enabled: bool) -> Self {
        self.locking_enabled = enabled;
        self
    }

    pub fn processor(&self) -> &TaskProcessor {
        &self.processor
    }

    pub fn hooks(&self) -> &ShutdownHooks {
        &self.hooks
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    pub fn is_locking_enabled(&self) -> bool {
        self.locking_enabled
    }

    pub fn is_auto_open(&self) -> bool {
        self.auto_open.load(Ordering::SeqCst)
    }

    pub fn set_auto_open(&self, on: bool) {
        self.auto_open.store(on, Ordering::SeqCst);
    }

    pub fn device_parameters(&self, name: &str) -> Option<&Parameters> {
        self.device_parameters.get(name)
    }

    /// Runs the exit hooks, then stops the processor.
    pub fn shutdown(&self) -> usize {
        let disposed = self.hooks.run();
        self.processor.shutdown();
        disposed
    }
}

impl Default for RelayContext {
    fn default() -> Self {
        Self::new(std::env::temp_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;

    #[test]
    fn built_from_config() {
        let mut config = RelayConfig {
            auto_open: true,
            ..RelayConfig::default()
        };
        config.lock.enabled = false;
        config.lock.directory = Some(PathBuf::from("/var/lock/relays"));
        let mut device = DeviceConfig::default();
        device
            .parameters
            .insert("baud".to_string(), toml::Value::Integer(9600));
        config.devices.insert("COM3".to_string(), device);

        let context = RelayContext::from_config(&config).unwrap();
        assert!(context.is_auto_open());
        assert!(!context.is_locking_enabled());
        assert_eq!(context.lock_dir(), Path::new("/var/lock/relays"));
        assert_eq!(
            context.device_parameters("COM3").unwrap()["baud"],
            serde_json::json!(9600)
        );
        assert!(context.device_parameters("COM4").is_none());
    }

    #[test]
    fn auto_open_is_switchable() {
        let context = RelayContext::default();
        assert!(!context.is_auto_open());
        context.set_auto_open(true);
        assert!(context.is_auto_open());
    }
}
