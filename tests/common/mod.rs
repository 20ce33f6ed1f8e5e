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

#![allow(dead_code)]

use relaykit::{RelayContext, RelayDevice, RelayDriver, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

/// Bookkeeping shared by all devices of one recording driver.
#[derive(Default)]
pub struct Journal {
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Journal {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    /// Highest number of device calls that were in flight at once.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn record(&self, call: String, work: Duration) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        thread::sleep(work);
        self.calls.lock().unwrap().push(call);
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct RecordingDevice {
    name: String,
    journal: Arc<Journal>,
    work: Duration,
    open: AtomicBool,
}

impl RelayDevice for RecordingDevice {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open(&self) -> Result<()> {
        self.journal.record(format!("open {}", self.name), self.work);
        self.open.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.journal.record(format!("close {}", self.name), self.work);
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn dispose(&self) -> Result<()> {
        self.journal.record(format!("dispose {}", self.name), self.work);
        self.open.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

pub struct RecordingDriver {
    devices: Vec<Arc<RecordingDevice>>,
    thread_safe: bool,
    pub journal: Arc<Journal>,
}

impl RecordingDriver {
    /// Driver with devices `Rec-0` .. `Rec-{count - 1}`, each call taking `work`.
    pub fn new(count: usize, thread_safe: bool, work: Duration) -> Self {
        let journal = Arc::new(Journal::default());
        let devices = (0..count)
            .map(|i| {
                Arc::new(RecordingDevice {
                    name: format!("Rec-{i}"),
                    journal: journal.clone(),
                    work,
                    open: AtomicBool::new(false),
                })
            })
            .collect();
        Self {
            devices,
            thread_safe,
            journal,
        }
    }
}

impl RelayDriver for RecordingDriver {
    fn devices(&self) -> Result<Vec<Arc<dyn RelayDevice>>> {
        Ok(self
            .devices
            .iter()
            .map(|d| d.clone() as Arc<dyn RelayDevice>)
            .collect())
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }
}

pub fn context(temp: &TempDir) -> RelayContext {
    RelayContext::new(temp.path().to_path_buf())
}
