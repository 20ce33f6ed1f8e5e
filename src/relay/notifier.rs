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

//! Per-handle notification worker.
//!
//! Listener callbacks of one handle run on a dedicated thread in submission
//! order. The worker lives from open to close.

use crate::error::Result;
use crate::worker::spawn_worker;
use log::debug;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};

type Notification = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
pub(crate) struct Notifier {
    sender: Sender<Notification>,
    handle: JoinHandle<()>,
    worker: ThreadId,
}

impl Notifier {
    pub fn start(device: &str) -> Result<Self> {
        let (sender, notifications) = mpsc::channel::<Notification>();
        let name = format!("notificator-[{device}]");
        let handle = spawn_worker(name, move || {
            for notification in notifications {
                notification();
            }
        })?;
        let worker = handle.thread().id();
        Ok(Self {
            sender,
            handle,
            worker,
        })
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.worker
    }

    pub fn sender(&self) -> Sender<Notification> {
        self.sender.clone()
    }

    /// Stops accepting notifications and waits until the queued ones ran.
    ///
    /// Called from the worker itself the queue is left to drain on its own.
    pub fn shutdown(self) {
        let Self {
            sender,
            handle,
            worker,
        } = self;
        drop(sender);
        if worker == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            debug!("Notification worker terminated abnormally");
        }
    }
}

/// Queues `notification`, or runs it inline when `sender` is gone or when
/// already on the worker.
pub(crate) fn deliver(
    notifier: Option<(Sender<Notification>, bool)>,
    wait: bool,
    notification: impl FnOnce() + Send + 'static,
) {
    let Some((sender, on_worker)) = notifier else {
        notification();
        return;
    };
    if on_worker {
        notification();
        return;
    }

    if !wait {
        if let Err(returned) = sender.send(Box::new(notification)) {
            (returned.0)();
        }
        return;
    }

    let (done, delivered) = mpsc::channel::<()>();
    let job: Notification = Box::new(move || {
        notification();
        let _ = done.send(());
    });
    match sender.send(job) {
        Ok(()) => {
            // A disconnect means the job was dropped unrun by a dying worker.
            let _ = delivered.recv();
        }
        Err(returned) => (returned.0)(),
    }
}
