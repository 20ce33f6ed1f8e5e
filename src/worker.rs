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

//! Background worker threads.
//!
//! Every thread the framework starts goes through [`spawn_worker`], which names
//! the thread and routes panics to [`report_panic`] so a crashing worker is
//! logged instead of vanishing silently.

use crate::error::{RelayError, Result};
use log::error;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Spawns a named background thread whose panics are logged.
pub(crate) fn spawn_worker<F>(name: String, body: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let reported = name.clone();
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(body)) {
                report_panic(&reported, payload.as_ref());
            }
        })
        .map_err(|err| RelayError::SystemError(format!("Failed to spawn {name}: {err}")))
}

/// Runs `body`, converting a panic into an error message.
pub(crate) fn catch_panic<T, F>(body: F) -> std::result::Result<T, String>
where
    F: FnOnce() -> T,
{
    panic::catch_unwind(AssertUnwindSafe(body)).map_err(|payload| panic_message(payload.as_ref()))
}

/// Fallback handler for panics escaping a worker.
pub(crate) fn report_panic(thread_name: &str, payload: &(dyn Any + Send)) {
    error!(
        "Exception in thread {thread_name}: {}",
        panic_message(payload)
    );
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Joins `handle`, giving up after `timeout`. Returns whether the thread finished.
pub(crate) fn join_with_timeout(handle: JoinHandle<()>, timeout: Duration) -> bool {
    let deadline = Instant::now().checked_add(timeout);
    while !handle.is_finished() {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return false;
        }
        thread::sleep(JOIN_POLL_INTERVAL);
    }
    // Panics were already reported inside the worker.
    let _ = handle.join();
    true
}
