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

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// File name prefix shared by every relay lock file.
pub(crate) const LOCK_FILE_PREFIX: &str = ".relay-lock-";
/// Segment marking temporary heartbeat files awaiting rename.
pub(crate) const STAGING_SEGMENT: &str = "-tmp";

const IDENTITY_BYTES: usize = 8;

/// Stable, process-independent identity for a device name.
pub fn lock_identity(device_name: &str) -> String {
    let digest = Sha256::digest(device_name.as_bytes());
    hex::encode(&digest[..IDENTITY_BYTES])
}

pub fn lock_file_name(device_name: &str) -> String {
    format!("{LOCK_FILE_PREFIX}{}", lock_identity(device_name))
}

pub fn lock_path(lock_dir: &Path, device_name: &str) -> PathBuf {
    lock_dir.join(lock_file_name(device_name))
}

/// Prefix for the temporary file a heartbeat is staged in.
pub(crate) fn staging_prefix(lock_path: &Path) -> String {
    let mut name = lock_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(STAGING_SEGMENT);
    name
}

pub(crate) fn is_lock_file(path: &Path) -> bool {
    file_name(path)
        .and_then(|name| name.strip_prefix(LOCK_FILE_PREFIX))
        .is_some_and(|rest| {
            rest.len() == IDENTITY_BYTES * 2 && rest.chars().all(|c| c.is_ascii_hexdigit())
        })
}

pub(crate) fn is_staging_file(path: &Path) -> bool {
    file_name(path).is_some_and(|name| {
        name.starts_with(LOCK_FILE_PREFIX) && name.contains(STAGING_SEGMENT)
    })
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_deterministic() {
        assert_eq!(lock_identity("Dummy-0"), lock_identity("Dummy-0"));
        assert_ne!(lock_identity("Dummy-0"), lock_identity("Dummy-1"));
        assert_eq!(lock_identity("Dummy-0").len(), 16);
    }

    #[test]
    fn lock_path_lives_in_directory() {
        let dir = Path::new("/tmp");
        let path = lock_path(dir, "USB Relay 1");
        assert_eq!(path.parent(), Some(dir));
        assert!(is_lock_file(&path));
        assert!(!is_staging_file(&path));
    }

    #[test]
    fn staging_files_are_recognised() {
        let path = lock_path(Path::new("/tmp"), "relay");
        let staging = Path::new("/tmp").join(format!("{}abc123", staging_prefix(&path)));
        assert!(is_staging_file(&staging));
        assert!(!is_lock_file(&staging));
        assert!(!is_lock_file(Path::new("/tmp/.relay-lock-xyz")));
        assert!(!is_lock_file(Path::new("/tmp/unrelated")));
    }
}
