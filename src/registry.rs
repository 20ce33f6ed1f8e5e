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

//! Entry point tying drivers, discovery and shared relay state together.
//!
//! Driver resolution order is: a driver set explicitly (instance or
//! factory), then the first registered candidate that instantiates, then an
//! empty dummy driver so callers always get a working, if device-less,
//! registry.

use crate::config::RelayConfig;
use crate::discovery::{DiscoveryListener, DiscoveryService};
use crate::driver::{DriverCandidate, DriverCatalog, DummyDriver, RelayDriver};
use crate::error::{RelayError, Result};
use crate::relay::{ListenerSet, Relay, RelayContext};
use crate::shutdown::Deallocator;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub struct RelayRegistry {
    context: Arc<RelayContext>,
    catalog: Mutex<DriverCatalog>,
    preferred_driver: Option<String>,
    driver: Mutex<Option<Arc<dyn RelayDriver>>>,
    discovery: Mutex<Option<Arc<DiscoveryService>>>,
    discovery_listeners: Arc<ListenerSet<dyn DiscoveryListener>>,
    discovery_enabled: bool,
    default_timeout: Duration,
    handle_term_signal: AtomicBool,
    deallocator: Mutex<Option<Arc<Deallocator>>>,
    shut_down: AtomicBool,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::with_context(RelayContext::default())
    }

    pub fn with_context(context: RelayContext) -> Self {
        Self {
            context: Arc::new(context),
            catalog: Mutex::new(DriverCatalog::new()),
            preferred_driver: None,
            driver: Mutex::new(None),
            discovery: Mutex::new(None),
            discovery_listeners: Arc::new(ListenerSet::new()),
            discovery_enabled: true,
            default_timeout: Duration::MAX,
            handle_term_signal: AtomicBool::new(false),
            deallocator: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let mut registry = Self::with_context(RelayContext::from_config(config)?);
        registry.preferred_driver = config.driver.clone();
        registry.discovery_enabled = config.discovery.enabled;
        registry.default_timeout = config.discovery.timeout();
        if config.handle_term_signal {
            registry.set_handle_term_signal(true);
        }
        Ok(registry)
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.context
    }

    /// Uses `driver` from now on, shutting down whatever was discovered before.
    pub fn set_driver(&self, driver: Arc<dyn RelayDriver>) {
        debug!("Setting new driver {}", driver.label());
        self.reset_driver();
        *self.driver_slot() = Some(driver);
    }

    /// Like [`RelayRegistry::set_driver`], constructing the driver with `factory`.
    pub fn set_driver_factory<F>(&self, factory: F) -> Result<()>
    where
        F: FnOnce() -> Result<Arc<dyn RelayDriver>>,
    {
        self.reset_driver();
        let driver = factory()?;
        debug!("Setting new driver {}", driver.label());
        *self.driver_slot() = Some(driver);
        Ok(())
    }

    /// Adds a named driver candidate consulted when no driver is set.
    pub fn register_driver(&self, candidate: DriverCandidate) {
        self.catalog().register(candidate);
    }

    /// Forgets the current driver and candidates, shutting discovery down.
    pub fn reset_driver(&self) {
        self.catalog().clear();

        let discovery = self.discovery_slot().take();
        if let Some(discovery) = discovery {
            discovery.shutdown();
        }

        *self.driver_slot() = None;
    }

    /// The driver in use, resolving one on first access.
    pub fn driver(&self) -> Arc<dyn RelayDriver> {
        let mut slot = self.driver_slot();
        if let Some(driver) = slot.as_ref() {
            return Arc::clone(driver);
        }

        let driver = match self.catalog().find(self.preferred_driver.as_deref()) {
            Some((name, driver)) => {
                debug!("Resolved registered driver {name}");
                driver
            }
            None => Arc::new(DummyDriver::empty()) as Arc<dyn RelayDriver>,
        };
        info!("{} relay driver will be used", driver.label());
        *slot = Some(Arc::clone(&driver));
        driver
    }

    /// The discovery service for the current driver, created on demand.
    pub fn discovery_service(&self) -> Result<Arc<DiscoveryService>> {
        if self.is_shut_down() {
            return Err(RelayError::SystemError(
                "Relay registry has been already shut down".to_string(),
            ));
        }

        let mut slot = self.discovery_slot();
        if let Some(discovery) = slot.as_ref() {
            return Ok(Arc::clone(discovery));
        }

        let service = DiscoveryService::new(
            self.driver(),
            Arc::clone(&self.context),
            Arc::clone(&self.discovery_listeners),
        );
        service.set_deallocator(self.deallocator());
        service.set_enabled(self.discovery_enabled);

        let service = Arc::new(service);
        *slot = Some(Arc::clone(&service));
        Ok(service)
    }

    /// The discovery service if one has been created, without creating it.
    pub fn discovery_service_ref(&self) -> Option<Arc<DiscoveryService>> {
        self.discovery_slot().clone()
    }

    /// Known relays, using the configured discovery timeout.
    pub fn get_relays(&self) -> Result<Vec<Relay>> {
        self.get_relays_timeout(self.default_timeout)
    }

    /// Known relays; also starts background discovery if it is not running.
    pub fn get_relays_timeout(&self, timeout: Duration) -> Result<Vec<Relay>> {
        let discovery = self.discovery_service()?;
        let relays = discovery.get_relays(timeout)?;
        if !discovery.is_running() {
            discovery.start()?;
        }
        Ok(relays)
    }

    /// The first known relay, if any.
    pub fn get_default(&self) -> Result<Option<Relay>> {
        self.get_default_timeout(self.default_timeout)
    }

    pub fn get_default_timeout(&self, timeout: Duration) -> Result<Option<Relay>> {
        let relay = self.get_relays_timeout(timeout)?.into_iter().next();
        if relay.is_none() {
            warn!("No relays have been detected!");
        }
        Ok(relay)
    }

    pub fn get_relay_by_name(&self, name: &str) -> Result<Option<Relay>> {
        Ok(self
            .get_relays()?
            .into_iter()
            .find(|relay| relay.name() == name))
    }

    pub fn add_discovery_listener(&self, listener: Arc<dyn DiscoveryListener>) -> bool {
        self.discovery_listeners.add(listener)
    }

    pub fn remove_discovery_listener(&self, listener: &Arc<dyn DiscoveryListener>) -> bool {
        self.discovery_listeners.remove(listener)
    }

    pub fn discovery_listeners(&self) -> Vec<Arc<dyn DiscoveryListener>> {
        self.discovery_listeners.snapshot()
    }

    pub fn set_auto_open(&self, on: bool) {
        self.context.set_auto_open(on);
    }

    pub fn is_auto_open(&self) -> bool {
        self.context.is_auto_open()
    }

    /// Enables disposal of discovered relays on SIGTERM.
    ///
    /// Relays already discovered are tracked right away. Switching it off
    /// detaches the handler from discovery and uninstalls it once the last
    /// reference is gone. Failing to install the signal handler is logged and
    /// leaves the switch off.
    pub fn set_handle_term_signal(&self, on: bool) {
        if !on {
            self.handle_term_signal.store(false, Ordering::SeqCst);
            self.detach_deallocator();
            return;
        }

        let deallocator = {
            let mut slot = self.deallocator_slot();
            match slot.as_ref() {
                Some(deallocator) => Arc::clone(deallocator),
                None => match Deallocator::install() {
                    Ok(deallocator) => {
                        let deallocator = Arc::new(deallocator);
                        *slot = Some(Arc::clone(&deallocator));
                        deallocator
                    }
                    Err(err) => {
                        warn!("Failed to install TERM signal handler: {err}");
                        return;
                    }
                },
            }
        };

        if let Some(discovery) = self.discovery_service_ref() {
            discovery.set_deallocator(Some(deallocator));
        }
        self.handle_term_signal.store(true, Ordering::SeqCst);
    }

    /// The SIGTERM deallocator, while termination handling is on.
    pub fn deallocator(&self) -> Option<Arc<Deallocator>> {
        self.deallocator_slot().clone()
    }

    pub fn is_handle_term_signal(&self) -> bool {
        self.handle_term_signal.load(Ordering::SeqCst)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Stops discovery, disposes relays that are still open and stops the
    /// processor. Later calls do nothing.
    pub fn shutdown(&self) {
        if self
            .shut_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        if let Some(discovery) = self.discovery_service_ref() {
            discovery.stop();
        }

        let disposed = self.context.shutdown();
        if disposed > 0 {
            info!("Disposed {disposed} open relay(s) during shutdown");
        }

        self.detach_deallocator();
        debug!("Relay registry has been shut down");
    }

    fn detach_deallocator(&self) {
        let deallocator = self.deallocator_slot().take();
        if let Some(discovery) = self.discovery_service_ref() {
            discovery.set_deallocator(None);
        }
        if let Some(deallocator) = deallocator {
            deallocator.unstore();
        }
    }

    fn catalog(&self) -> MutexGuard<'_, DriverCatalog> {
        self.catalog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn driver_slot(&self) -> MutexGuard<'_, Option<Arc<dyn RelayDriver>>> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn discovery_slot(&self) -> MutexGuard<'_, Option<Arc<DiscoveryService>>> {
        self.discovery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deallocator_slot(&self) -> MutexGuard<'_, Option<Arc<Deallocator>>> {
        self.deallocator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RelayRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RelayRegistry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RelayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayRegistry")
            .field("context", &self.context)
            .field("catalog", &self.catalog().names())
            .field("discovery", &self.discovery_service_ref())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
