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

//! Heartbeat file I/O.
//!
//! A lock file holds a single big-endian `i64`: the wall-clock time in
//! milliseconds of the holder's last heartbeat, or [`UNLOCKED`] once the
//! holder let go. Writes are staged in a temporary file next to the lock and
//! renamed into place. When the rename is refused the staged bytes are copied
//! over the lock file instead, retrying a bounded number of times.

use crate::error::{RelayError, Result};
use crate::locking::path::staging_prefix;
use log::{debug, warn};
use retry::delay::Fixed;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Period between two heartbeats of a held lock.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(2000);

/// Value written when the holder released the lock.
pub const UNLOCKED: i64 = -1;

const MAX_WRITE_ATTEMPTS: usize = 5;
const REWRITE_DELAY_MS: u64 = 20;
const VALUE_LEN: usize = std::mem::size_of::<i64>();

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A heartbeat is fresh when it is younger than two intervals.
pub fn is_fresh(timestamp: i64, now: i64) -> bool {
    let window = HEARTBEAT_INTERVAL.as_millis() as i64 * 2;
    timestamp > now - window
}

#[derive(Debug)]
pub(crate) struct LockFile {
    path: PathBuf,
    io_guard: Mutex<()>,
}

impl LockFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            io_guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn write(&self, value: i64) -> Result<()> {
        let _guard = self.io_guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.write_locked(value)
    }

    /// Reads the stored value. `None` means there is no lock file.
    ///
    /// A truncated file is reset to [`UNLOCKED`] and reported as such.
    pub fn read(&self) -> Result<Option<i64>> {
        let _guard = self.io_guard.lock().unwrap_or_else(PoisonError::into_inner);

        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(self.read_error(err)),
        };

        let mut buffer = [0u8; VALUE_LEN];
        match file.read_exact(&mut buffer) {
            Ok(()) => Ok(Some(i64::from_be_bytes(buffer))),
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                drop(file);
                warn!(
                    "Lock file {} is broken, recreating it",
                    self.path.display()
                );
                self.write_locked(UNLOCKED)?;
                Ok(Some(UNLOCKED))
            }
            Err(err) => Err(self.read_error(err)),
        }
    }

    /// Removes the lock file; returns whether it existed.
    pub fn remove(&self) -> Result<bool> {
        let _guard = self.io_guard.lock().unwrap_or_else(PoisonError::into_inner);
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(self.write_error(err)),
        }
    }

    fn write_locked(&self, value: i64) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| RelayError::LockWrite {
                path: self.path.display().to_string(),
                details: "lock file has no parent directory".to_string(),
            })?;
        fs::create_dir_all(dir).map_err(|err| self.write_error(err))?;

        let mut staged = tempfile::Builder::new()
            .prefix(&staging_prefix(&self.path))
            .tempfile_in(dir)
            .map_err(|err| self.write_error(err))?;
        staged
            .write_all(&value.to_be_bytes())
            .and_then(|()| staged.flush())
            .map_err(|err| self.write_error(err))?;

        match staged.persist(&self.path) {
            Ok(_) => Ok(()),
            Err(err) => {
                debug!(
                    "Rename onto {} failed ({}), rewriting in place",
                    self.path.display(),
                    err.error
                );
                self.copy_with_retries(err.file.path())
            }
        }
    }

    fn copy_with_retries(&self, staged: &Path) -> Result<()> {
        let delays = Fixed::from_millis(REWRITE_DELAY_MS).take(MAX_WRITE_ATTEMPTS - 1);
        retry::retry(delays, || fs::copy(staged, &self.path).map(|_| ()))
            .map_err(|err| self.write_error(err.error))
    }

    fn write_error(&self, err: io::Error) -> RelayError {
        RelayError::LockWrite {
            path: self.path.display().to_string(),
            details: err.to_string(),
        }
    }

    fn read_error(&self, err: io::Error) -> RelayError {
        RelayError::LockRead {
            path: self.path.display().to_string(),
            details: err.to_string(),
        }
    }
}
