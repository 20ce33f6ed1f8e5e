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

//! Cross-process relay locking based on heartbeat files.

pub mod heartbeat;
pub mod hygiene;
pub mod lock;
pub mod path;

pub use heartbeat::{HEARTBEAT_INTERVAL, UNLOCKED, is_fresh};
pub use hygiene::{HeartbeatState, LockEntry, LockHygieneReport, LockHygieneRunner, list_locks};
pub use lock::RelayLock;
pub use path::{lock_identity, lock_path};
