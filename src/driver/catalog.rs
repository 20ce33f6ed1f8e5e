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

//! Name-based driver lookup.
//!
//! Drivers that should be picked up without being set explicitly register a
//! named factory. Resolution walks the candidates in registration order and
//! takes the first factory that succeeds, trying the preferred name first.

use crate::driver::RelayDriver;
use crate::error::Result;
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;

/// Constructor for a driver, invoked lazily during resolution.
pub type DriverFactory = Arc<dyn Fn() -> Result<Arc<dyn RelayDriver>> + Send + Sync>;

#[derive(Clone)]
pub struct DriverCandidate {
    name: String,
    factory: DriverFactory,
}

impl DriverCandidate {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn RelayDriver>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Arc::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self) -> Result<Arc<dyn RelayDriver>> {
        (self.factory)()
    }
}

impl fmt::Debug for DriverCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverCandidate")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default, Clone)]
pub struct DriverCatalog {
    candidates: Vec<DriverCandidate>,
}

impl DriverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, candidate: DriverCandidate) {
        debug!("Registering relay driver candidate {}", candidate.name());
        self.candidates.push(candidate);
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.name.clone()).collect()
    }

    /// Finds the first candidate whose factory succeeds.
    pub fn find(&self, preferred: Option<&str>) -> Option<(String, Arc<dyn RelayDriver>)> {
        if let Some(preferred) = preferred {
            match self.candidates.iter().find(|c| c.name == preferred) {
                Some(candidate) => {
                    if let Some(driver) = Self::try_instantiate(candidate) {
                        return Some((candidate.name.clone(), driver));
                    }
                }
                None => warn!("Preferred relay driver '{preferred}' has not been registered"),
            }
        }

        self.candidates
            .iter()
            .filter(|c| Some(c.name.as_str()) != preferred)
            .find_map(|c| Self::try_instantiate(c).map(|driver| (c.name.clone(), driver)))
    }

    fn try_instantiate(candidate: &DriverCandidate) -> Option<Arc<dyn RelayDriver>> {
        match candidate.instantiate() {
            Ok(driver) => Some(driver),
            Err(err) => {
                debug!("Relay driver {} is not available: {err}", candidate.name);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DummyDriver;
    use crate::error::RelayError;

    fn dummy(count: usize) -> DriverCandidate {
        DriverCandidate::new(format!("dummy-{count}"), move || {
            Ok(Arc::new(DummyDriver::new(count)) as Arc<dyn RelayDriver>)
        })
    }

    fn failing(name: &str) -> DriverCandidate {
        DriverCandidate::new(name, || Err(RelayError::Driver("no transport".to_string())))
    }

    #[test]
    fn empty_catalog_finds_nothing() {
        assert!(DriverCatalog::new().find(None).is_none());
    }

    #[test]
    fn first_working_candidate_wins() {
        let mut catalog = DriverCatalog::new();
        catalog.register(failing("serial"));
        catalog.register(dummy(2));
        catalog.register(dummy(3));

        let (name, driver) = catalog.find(None).unwrap();
        assert_eq!(name, "dummy-2");
        assert_eq!(driver.devices().unwrap().len(), 2);
    }

    #[test]
    fn preferred_candidate_is_tried_first() {
        let mut catalog = DriverCatalog::new();
        catalog.register(dummy(2));
        catalog.register(dummy(3));

        let (name, _) = catalog.find(Some("dummy-3")).unwrap();
        assert_eq!(name, "dummy-3");
    }

    #[test]
    fn unknown_or_failing_preference_falls_back() {
        let mut catalog = DriverCatalog::new();
        catalog.register(failing("serial"));
        catalog.register(dummy(1));

        assert_eq!(catalog.find(Some("usb")).unwrap().0, "dummy-1");
        assert_eq!(catalog.find(Some("serial")).unwrap().0, "dummy-1");
        assert_eq!(catalog.names(), vec!["serial", "dummy-1"]);
    }
}
