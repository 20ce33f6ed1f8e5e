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

mod common;

use common::RecordingDriver;
use relaykit::{RelayError, RelayRegistry};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn open_and_close_concurrently(registry: &RelayRegistry) {
    let relays = registry.get_relays().unwrap();
    thread::scope(|scope| {
        for relay in &relays {
            scope.spawn(move || {
                assert!(relay.open().unwrap());
                assert!(relay.close().unwrap());
            });
        }
    });
}

#[test]
fn non_thread_safe_driver_calls_never_overlap() {
    let temp = TempDir::new().unwrap();
    let registry = RelayRegistry::with_context(common::context(&temp));
    let driver = Arc::new(RecordingDriver::new(6, false, Duration::from_millis(20)));
    registry.set_driver(driver.clone());

    open_and_close_concurrently(&registry);

    assert_eq!(driver.journal.max_active(), 1);
    for i in 0..6 {
        assert_eq!(driver.journal.count(&format!("open Rec-{i}")), 1);
        assert_eq!(driver.journal.count(&format!("close Rec-{i}")), 1);
    }
    assert!(registry.context().processor().is_started());
}

#[test]
fn thread_safe_driver_bypasses_processor() {
    let temp = TempDir::new().unwrap();
    let registry = RelayRegistry::with_context(common::context(&temp));
    let driver = Arc::new(RecordingDriver::new(4, true, Duration::from_millis(50)));
    registry.set_driver(driver.clone());

    open_and_close_concurrently(&registry);

    assert_eq!(driver.journal.calls().len(), 8);
    assert!(!registry.context().processor().is_started());
}

#[test]
fn work_after_shutdown_is_rejected() {
    let temp = TempDir::new().unwrap();
    let registry = RelayRegistry::with_context(common::context(&temp));
    let driver = Arc::new(RecordingDriver::new(1, false, Duration::ZERO));
    registry.set_driver(driver.clone());
    let relay = registry.get_default().unwrap().unwrap();

    registry.shutdown();

    let err = relay.open().unwrap_err();
    assert!(matches!(err, RelayError::ProcessorRejected));
    assert!(!relay.is_open());
    assert!(driver.journal.calls().is_empty());
}
