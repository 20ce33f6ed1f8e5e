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
use crate::locking::heartbeat::{HEARTBEAT_INTERVAL, LockFile, UNLOCKED, is_fresh, now_millis};
use crate::locking::path::lock_path;
use crate::worker::spawn_worker;
use log::{debug, info, trace, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

/// System-wide advisory lock for one relay device.
///
/// While held, a background updater refreshes the heartbeat every
/// [`HEARTBEAT_INTERVAL`]. Other processes consider the device locked as long
/// as the heartbeat is fresh, so a crashed holder stops blocking others after
/// roughly two intervals.
#[derive(Debug)]
pub struct RelayLock {
    device: String,
    file: Arc<LockFile>,
    locked: Arc<AtomicBool>,
    disabled: AtomicBool,
    updater: Mutex<Option<Updater>>,
}

#[derive(Debug)]
struct Updater {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Updater {
    fn stop(self) {
        // Either the signal or the disconnect wakes the updater.
        let _ = self.stop.send(());
        drop(self.stop);
        if self.handle.join().is_err() {
            debug!("Lock updater terminated abnormally");
        }
    }
}

impl RelayLock {
    pub fn new(device: impl Into<String>, lock_dir: &Path) -> Self {
        let device = device.into();
        let path = lock_path(lock_dir, &device);
        Self {
            device,
            file: Arc::new(LockFile::new(path)),
            locked: Arc::new(AtomicBool::new(false)),
            disabled: AtomicBool::new(false),
            updater: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Whether this process holds the lock.
    pub fn is_held(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    /// Takes the lock and starts the heartbeat updater.
    ///
    /// Fails with [`RelayError::LockContended`] when another holder has a
    /// fresh heartbeat, including when this lock itself already holds it.
    pub fn lock(&self) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }

        if self.is_locked()? {
            return Err(RelayError::LockContended {
                device: self.device.clone(),
            });
        }

        if self
            .locked
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        debug!("Lock {}", self.device);

        if let Err(err) = self.file.write(now_millis()) {
            self.locked.store(false, Ordering::SeqCst);
            return Err(err);
        }

        match self.start_updater() {
            Ok(updater) => {
                *self.updater_slot() = Some(updater);
                Ok(())
            }
            Err(err) => {
                self.locked.store(false, Ordering::SeqCst);
                let _ = self.file.remove();
                Err(err)
            }
        }
    }

    /// Releases the lock: stops the updater, writes the sentinel and removes
    /// the file. Releasing a lock that is not held is a no-op.
    pub fn unlock(&self) -> Result<()> {
        if self.is_disabled() {
            return Ok(());
        }

        if self
            .locked
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        debug!("Unlock {}", self.device);

        self.stop_updater();
        self.file.write(UNLOCKED)?;
        self.file.remove()?;
        Ok(())
    }

    /// Whether the device is locked, by this process or by another one.
    pub fn is_locked(&self) -> Result<bool> {
        if self.is_disabled() {
            return Ok(false);
        }

        if self.is_held() {
            return Ok(true);
        }

        let Some(timestamp) = self.file.read()? else {
            return Ok(false);
        };

        let now = now_millis();
        trace!("Lock timestamp {timestamp} now {now} for {}", self.device);
        Ok(is_fresh(timestamp, now))
    }

    /// Turns the lock into a no-op for the rest of its life.
    pub fn disable(&self) {
        if self
            .disabled
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Locking mechanism has been disabled in {}", self.device);
            self.stop_updater();
        }
    }

    fn start_updater(&self) -> Result<Updater> {
        let (stop, stopped) = mpsc::channel::<()>();
        let file = Arc::clone(&self.file);
        let locked = Arc::clone(&self.locked);
        let device = self.device.clone();

        let handle = spawn_worker(format!("relay-lock-[{}]", self.device), move || {
            loop {
                match stopped.recv_timeout(HEARTBEAT_INTERVAL) {
                    Err(RecvTimeoutError::Timeout) if locked.load(Ordering::SeqCst) => {
                        if let Err(err) = file.write(now_millis()) {
                            warn!("Failed to refresh lock for {device}: {err}");
                        }
                    }
                    _ => break,
                }
            }
            debug!("Lock updater for {device} has been stopped");
        })?;

        Ok(Updater { stop, handle })
    }

    fn stop_updater(&self) {
        let updater = self.updater_slot().take();
        if let Some(updater) = updater {
            updater.stop();
        }
    }

    fn updater_slot(&self) -> std::sync::MutexGuard<'_, Option<Updater>> {
        self.updater.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RelayLock {
    fn drop(&mut self) {
        if !self.is_held() {
            return;
        }
        if let Err(err) = self.unlock() {
            warn!("Failed to release lock for {}: {err}", self.device);
        }
    }
}
