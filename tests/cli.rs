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

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use std::fs;
use tempfile::TempDir;

/// Config directory whose relay.toml points the lock directory into `temp`.
fn config_dir(temp: &TempDir) -> std::path::PathBuf {
    let locks = temp.path().join("locks");
    let dir = temp.path().join("config");
    fs::create_dir_all(&dir).unwrap();
    fs::write(
        dir.join("relay.toml"),
        format!("[lock]\ndirectory = {:?}\n", locks.display().to_string()),
    )
    .unwrap();
    dir
}

fn relaykit(temp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("relaykit").unwrap();
    cmd.arg("--config-dir").arg(config_dir(temp));
    cmd
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("relaykit")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("list"))
        .stdout(contains("open"))
        .stdout(contains("watch"))
        .stdout(contains("locks"));
}

#[test]
fn list_prints_dummy_relays() {
    let temp = TempDir::new().unwrap();
    relaykit(&temp)
        .args(["--dummy", "4", "list"])
        .assert()
        .success()
        .stdout(contains("Dummy-0"))
        .stdout(contains("Dummy-3"))
        .stdout(contains("Dummy-4").not());
}

#[test]
fn list_as_json() {
    let temp = TempDir::new().unwrap();
    let output = relaykit(&temp)
        .args(["--dummy", "2", "list", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let relays = parsed.as_array().unwrap();
    assert_eq!(relays.len(), 2);
    assert_eq!(relays[1]["name"], "Dummy-1");
    assert_eq!(relays[1]["open"], false);
}

#[test]
fn list_without_driver_reports_nothing() {
    let temp = TempDir::new().unwrap();
    relaykit(&temp)
        .arg("list")
        .assert()
        .success()
        .stdout(contains("No relays detected"));
}

#[test]
fn open_known_relay() {
    let temp = TempDir::new().unwrap();
    relaykit(&temp)
        .args(["--dummy", "2", "open", "Dummy-1"])
        .assert()
        .success()
        .stdout(contains("Opened Dummy-1"))
        .stdout(contains("Closed Dummy-1"));
}

#[test]
fn open_unknown_relay_fails_with_usage_code() {
    let temp = TempDir::new().unwrap();
    relaykit(&temp)
        .args(["--dummy", "1", "open", "Nope"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("Nope"));
}

#[test]
fn locks_on_empty_directory() {
    let temp = TempDir::new().unwrap();
    relaykit(&temp)
        .args(["locks", "--clean"])
        .assert()
        .success()
        .stdout(contains("No relay locks"))
        .stdout(contains("Removed 0 lock(s)"));
}
