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
use crate::error::Result;
use crate::locking::{HeartbeatState, LockHygieneRunner, list_locks};
use chrono::{DateTime, Local};

/// Lists relay lock files and optionally removes abandoned ones.
pub struct LocksCommand<'a> {
    config: &'a RelayConfig,
}

impl<'a> LocksCommand<'a> {
    pub fn new(config: &'a RelayConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, clean: bool) -> Result<()> {
        let directory = self.config.lock.directory();
        let entries = list_locks(&directory)?;

        if entries.is_empty() {
            println!("No relay locks in {}", directory.display());
        }

        for entry in &entries {
            let heartbeat = match entry.heartbeat {
                Some(ms) if entry.state != HeartbeatState::Released => {
                    DateTime::from_timestamp_millis(ms)
                        .map(|time| time.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
                        .unwrap_or_else(|| ms.to_string())
                }
                _ => "-".to_string(),
            };
            println!(
                "{} {:?} {heartbeat} {}",
                entry.identity,
                entry.state,
                entry.path.display()
            );
        }

        if clean {
            let runner = LockHygieneRunner::new(directory, self.config.lock.stale_after());
            let report = runner.run()?;
            println!(
                "Removed {} lock(s) and {} staging file(s), {} active, {} error(s)",
                report.removed_locks, report.removed_staging, report.active_locks, report.errors
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locking::RelayLock;
    use tempfile::TempDir;

    #[test]
    fn lists_and_cleans_lock_directory() {
        let temp = TempDir::new().unwrap();
        let mut config = RelayConfig::default();
        config.lock.directory = Some(temp.path().to_path_buf());

        let lock = RelayLock::new("Dummy-0", temp.path());
        lock.lock().unwrap();

        let command = LocksCommand::new(&config).unwrap();
        command.execute(true).unwrap();
        assert!(lock.path().exists());

        lock.unlock().unwrap();
        command.execute(false).unwrap();
    }
}
