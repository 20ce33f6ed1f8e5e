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

//! Hygiene routines for relay lock files.
//!
//! Processes that die without unlocking leave their lock file behind, and a
//! rename that never happened leaves a staging file. Neither blocks anybody
//! once the heartbeat goes stale, but they accumulate in the lock directory.
//! The runner removes abandoned lock files and old staging files, leaving
//! anything with a live heartbeat alone.

use crate::error::Result;
use crate::locking::heartbeat::{UNLOCKED, is_fresh, now_millis};
use crate::locking::path::{LOCK_FILE_PREFIX, is_lock_file, is_staging_file};
use log::{debug, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

/// Summary of a hygiene sweep.
#[derive(Debug, Default, Clone)]
pub struct LockHygieneReport {
    pub removed_locks: usize,
    pub removed_staging: usize,
    pub active_locks: usize,
    pub errors: usize,
    pub duration: Duration,
}

/// Observed state of one lock file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatState {
    /// The holder is alive.
    Active,
    /// The holder stopped refreshing the heartbeat.
    Stale,
    /// The holder wrote the unlocked sentinel.
    Released,
    /// The file does not hold a heartbeat.
    Broken,
}

#[derive(Debug, Clone)]
pub struct LockEntry {
    pub path: PathBuf,
    pub identity: String,
    pub heartbeat: Option<i64>,
    pub state: HeartbeatState,
}

/// Executes cleanup of abandoned relay lock artifacts in one directory.
#[derive(Debug, Clone)]
pub struct LockHygieneRunner {
    root: PathBuf,
    age_threshold: Duration,
}

impl LockHygieneRunner {
    pub fn new(root: PathBuf, age_threshold: Duration) -> Self {
        Self {
            root,
            age_threshold,
        }
    }

    pub fn run(&self) -> Result<LockHygieneReport> {
        self.run_with_now(SystemTime::now(), now_millis())
    }

    pub(crate) fn run_with_now(&self, now: SystemTime, now_ms: i64) -> Result<LockHygieneReport> {
        let start = Instant::now();
        let mut report = LockHygieneReport::default();

        if !self.root.exists() {
            report.duration = start.elapsed();
            return Ok(report);
        }

        for path in relay_files(&self.root, &mut report.errors)? {
            if is_staging_file(&path) {
                process_staging(&path, now, self.age_threshold, &mut report);
            } else if is_lock_file(&path) {
                self.process_lock(&path, now, now_ms, &mut report);
            }
        }

        report.duration = start.elapsed();
        debug!(
            "Lock hygiene sweep removed {} lock(s), {} staging file(s) in {:.3}s (active: {}, errors: {})",
            report.removed_locks,
            report.removed_staging,
            report.duration.as_secs_f64(),
            report.active_locks,
            report.errors
        );
        Ok(report)
    }

    fn process_lock(
        &self,
        path: &Path,
        now: SystemTime,
        now_ms: i64,
        report: &mut LockHygieneReport,
    ) {
        let state = match fs::read(path) {
            Ok(bytes) => classify(&bytes, now_ms).1,
            Err(err) => {
                warn!("Failed to read lock file {}: {err}", path.display());
                report.errors += 1;
                return;
            }
        };

        let removable = match state {
            HeartbeatState::Active => {
                report.active_locks += 1;
                false
            }
            HeartbeatState::Released => true,
            // Give a writer in the middle of a heartbeat the benefit of the doubt.
            HeartbeatState::Stale | HeartbeatState::Broken => {
                is_older_than(path, now, self.age_threshold)
            }
        };

        if !removable {
            return;
        }

        match remove_file_if_exists(path) {
            Ok(true) => report.removed_locks += 1,
            Ok(false) => {}
            Err(err) => {
                warn!("Failed to remove lock file {}: {err}", path.display());
                report.errors += 1;
            }
        }
    }
}

/// Lists the relay lock files in `root` together with their heartbeat state.
pub fn list_locks(root: &Path) -> Result<Vec<LockEntry>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut errors = 0;
    let now_ms = now_millis();
    let mut entries = Vec::new();
    for path in relay_files(root, &mut errors)? {
        if !is_lock_file(&path) {
            continue;
        }
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!("Skipping unreadable lock file {}: {err}", path.display());
                continue;
            }
        };
        let (heartbeat, state) = classify(&bytes, now_ms);
        let identity = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| name.strip_prefix(LOCK_FILE_PREFIX))
            .unwrap_or_default()
            .to_string();
        entries.push(LockEntry {
            path,
            identity,
            heartbeat,
            state,
        });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn relay_files(root: &Path, errors: &mut usize) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Failed to read entry in {}: {err}", root.display());
                *errors += 1;
                continue;
            }
        };
        let is_relay_file = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(LOCK_FILE_PREFIX));
        if !is_relay_file {
            continue;
        }
        match entry.file_type() {
            Ok(file_type) if file_type.is_file() => files.push(entry.path()),
            Ok(_) => {}
            Err(err) => {
                warn!(
                    "Failed to determine file type for {}: {err}",
                    entry.path().display()
                );
                *errors += 1;
            }
        }
    }
    Ok(files)
}

fn classify(bytes: &[u8], now_ms: i64) -> (Option<i64>, HeartbeatState) {
    let Ok(raw) = <[u8; 8]>::try_from(bytes) else {
        return (None, HeartbeatState::Broken);
    };
    let heartbeat = i64::from_be_bytes(raw);
    let state = if heartbeat == UNLOCKED {
        HeartbeatState::Released
    } else if is_fresh(heartbeat, now_ms) {
        HeartbeatState::Active
    } else {
        HeartbeatState::Stale
    };
    (Some(heartbeat), state)
}

fn process_staging(
    path: &Path,
    now: SystemTime,
    threshold: Duration,
    report: &mut LockHygieneReport,
) {
    if !is_older_than(path, now, threshold) {
        return;
    }

    match remove_file_if_exists(path) {
        Ok(true) => report.removed_staging += 1,
        Ok(false) => {}
        Err(err) => {
            warn!(
                "Failed to remove lock staging file {}: {err}",
                path.display()
            );
            report.errors += 1;
        }
    }
}

fn is_older_than(path: &Path, now: SystemTime, threshold: Duration) -> bool {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| now.duration_since(modified).ok())
        .is_some_and(|age| age >= threshold)
}

fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::path::lock_path;
    use tempfile::TempDir;

    fn write_heartbeat(root: &Path, device: &str, value: i64) -> PathBuf {
        let path = lock_path(root, device);
        fs::write(&path, value.to_be_bytes()).unwrap();
        path
    }

    #[test]
    fn released_locks_are_removed() {
        let temp = TempDir::new().unwrap();
        let path = write_heartbeat(temp.path(), "A", UNLOCKED);

        let runner = LockHygieneRunner::new(temp.path().to_path_buf(), Duration::from_secs(60));
        let report = runner.run().unwrap();

        assert_eq!(report.removed_locks, 1);
        assert!(!path.exists());
    }

    #[test]
    fn active_locks_are_preserved() {
        let temp = TempDir::new().unwrap();
        let path = write_heartbeat(temp.path(), "A", now_millis());

        let runner = LockHygieneRunner::new(temp.path().to_path_buf(), Duration::from_secs(1));
        let report = runner
            .run_with_now(SystemTime::now() + Duration::from_secs(5), now_millis())
            .unwrap();

        assert_eq!(report.removed_locks, 0);
        assert_eq!(report.active_locks, 1);
        assert!(path.exists());
    }

    #[test]
    fn stale_locks_are_removed_after_threshold() {
        let temp = TempDir::new().unwrap();
        let path = write_heartbeat(temp.path(), "A", now_millis() - 60_000);
        let runner = LockHygieneRunner::new(temp.path().to_path_buf(), Duration::from_secs(10));

        let report = runner.run().unwrap();
        assert_eq!(report.removed_locks, 0);
        assert!(path.exists());

        let later = SystemTime::now() + Duration::from_secs(30);
        let report = runner.run_with_now(later, now_millis()).unwrap();
        assert_eq!(report.removed_locks, 1);
        assert!(!path.exists());
    }

    #[test]
    fn stale_staging_files_are_removed() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join(".relay-lock-0011223344556677-tmpAbC123");
        fs::write(&staging, b"pend").unwrap();
        let unrelated = temp.path().join("notes.txt");
        fs::write(&unrelated, b"keep").unwrap();

        let runner = LockHygieneRunner::new(temp.path().to_path_buf(), Duration::from_secs(1));
        let report = runner
            .run_with_now(SystemTime::now() + Duration::from_secs(5), now_millis())
            .unwrap();

        assert_eq!(report.removed_staging, 1);
        assert!(!staging.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn missing_root_is_empty_report() {
        let temp = TempDir::new().unwrap();
        let runner = LockHygieneRunner::new(temp.path().join("absent"), Duration::from_secs(1));
        let report = runner.run().unwrap();
        assert_eq!(report.removed_locks + report.removed_staging + report.errors, 0);
        assert!(list_locks(&temp.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn list_reports_states() {
        let temp = TempDir::new().unwrap();
        write_heartbeat(temp.path(), "live", now_millis());
        write_heartbeat(temp.path(), "gone", UNLOCKED);
        fs::write(lock_path(temp.path(), "broken"), [1u8, 2]).unwrap();

        let entries = list_locks(temp.path()).unwrap();
        assert_eq!(entries.len(), 3);
        let state_of = |device: &str| {
            let path = lock_path(temp.path(), device);
            entries
                .iter()
                .find(|entry| entry.path == path)
                .map(|entry| entry.state.clone())
                .unwrap()
        };
        assert_eq!(state_of("live"), HeartbeatState::Active);
        assert_eq!(state_of("gone"), HeartbeatState::Released);
        assert_eq!(state_of("broken"), HeartbeatState::Broken);
    }
}
