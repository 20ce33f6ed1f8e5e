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

//! Single-worker serialization of native driver calls.
//!
//! Drivers that are not thread-safe must never see two calls at once, even
//! from unrelated handles. Every such call is handed to one long-lived worker
//! over a rendezvous channel; the caller blocks on a per-task reply channel
//! until the worker has run it. A task submitted from the worker itself runs
//! inline, so nested calls cannot deadlock.

mod task;

pub use task::{RelayTask, TaskKind};

use crate::error::{RelayError, Result};
use crate::worker::{catch_panic, join_with_timeout, spawn_worker};
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send + 'static>;

static PROCESSOR_NUMBER: AtomicUsize = AtomicUsize::new(0);

enum ProcessorState {
    Idle,
    Running {
        inbound: SyncSender<Job>,
        handle: JoinHandle<()>,
        worker: ThreadId,
    },
    Shutdown,
}

pub struct TaskProcessor {
    state: Mutex<ProcessorState>,
    shutdown_timeout: Duration,
}

impl TaskProcessor {
    pub fn new(shutdown_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(ProcessorState::Idle),
            shutdown_timeout,
        }
    }

    /// Whether the worker has been started and not shut down.
    pub fn is_started(&self) -> bool {
        matches!(*self.state(), ProcessorState::Running { .. })
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(*self.state(), ProcessorState::Shutdown)
    }

    /// Whether the calling thread is the processor worker.
    pub fn is_worker_thread(&self) -> bool {
        match &*self.state() {
            ProcessorState::Running { worker, .. } => *worker == thread::current().id(),
            _ => false,
        }
    }

    /// Runs `work` on the processor worker and waits for its outcome.
    ///
    /// `task` and `device` only label the error when the work panics or
    /// fails. The worker is started on first use.
    pub fn process<T, F>(&self, task: &str, device: &str, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        if self.is_worker_thread() {
            return catch_panic(work).unwrap_or_else(|details| {
                Err(processing_error(task, device, details))
            });
        }

        let inbound = self.inbound()?;
        let (reply, outcome) = mpsc::sync_channel::<std::result::Result<Result<T>, String>>(1);
        let job: Job = Box::new(move || {
            let _ = reply.send(catch_panic(work));
        });

        if inbound.send(job).is_err() {
            return Err(RelayError::ProcessorRejected);
        }

        match outcome.recv() {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(processing_error(task, device, err.to_string())),
            Ok(Err(panic)) => Err(processing_error(task, device, panic)),
            Err(_) => Err(RelayError::Cancelled {
                operation: format!("{task} task for {device}"),
            }),
        }
    }

    /// Stops accepting work and waits for the worker to finish.
    ///
    /// Returns whether the worker terminated within the shutdown timeout.
    pub fn shutdown(&self) -> bool {
        let previous = std::mem::replace(&mut *self.state(), ProcessorState::Shutdown);
        let ProcessorState::Running {
            inbound,
            handle,
            worker,
        } = previous
        else {
            return true;
        };

        debug!("Shutting down relay processor");
        drop(inbound);

        if worker == thread::current().id() {
            return true;
        }

        debug!("Awaiting tasks termination");
        let terminated = join_with_timeout(handle, self.shutdown_timeout);
        if terminated {
            debug!("All tasks have been terminated");
        } else {
            warn!(
                "Relay processor did not terminate within {} ms",
                self.shutdown_timeout.as_millis()
            );
        }
        terminated
    }

    fn inbound(&self) -> Result<SyncSender<Job>> {
        let mut state = self.state();
        match &*state {
            ProcessorState::Running { inbound, .. } => return Ok(inbound.clone()),
            ProcessorState::Shutdown => return Err(RelayError::ProcessorRejected),
            ProcessorState::Idle => {}
        }

        let (inbound, jobs) = mpsc::sync_channel::<Job>(0);
        let name = format!(
            "relay-processor-{}",
            PROCESSOR_NUMBER.fetch_add(1, Ordering::SeqCst) + 1
        );
        let handle = spawn_worker(name, move || run(jobs))?;
        let worker = handle.thread().id();
        debug!("Relay processor started");

        *state = ProcessorState::Running {
            inbound: inbound.clone(),
            handle,
            worker,
        };
        Ok(inbound)
    }

    fn state(&self) -> MutexGuard<'_, ProcessorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for TaskProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state() {
            ProcessorState::Idle => "idle",
            ProcessorState::Running { .. } => "running",
            ProcessorState::Shutdown => "shutdown",
        };
        f.debug_struct("TaskProcessor")
            .field("state", &state)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl Default for TaskProcessor {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Drop for TaskProcessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(jobs: Receiver<Job>) {
    // Ends once every sender is gone, i.e. after shutdown and in-flight calls.
    for job in jobs {
        job();
    }
    debug!("Relay processor worker stopped");
}

fn processing_error(task: &str, device: &str, details: String) -> RelayError {
    RelayError::Processing {
        task: task.to_string(),
        device: device.to_string(),
        details,
    }
}
