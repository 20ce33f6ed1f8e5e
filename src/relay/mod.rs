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

//! Relay handles.
//!
//! A [`Relay`] wraps one driver device and owns its lifecycle:
//!
//! ```text
//! Closed --open--> Open --close--> Closed
//!    \               |
//!     +--dispose-----+-----> Disposed (terminal)
//! ```
//!
//! Opening takes the cross-process lock for the device and starts a private
//! notification worker; closing tears both down again. Native calls go
//! through the task processor when the driver is not thread-safe.

mod context;
mod listener;
mod notifier;

pub use context::RelayContext;
pub use listener::{ListenerSet, RelayEvent, RelayEventType, RelayListener};
pub(crate) use listener::notify_all;

use crate::driver::{Parameters, RelayDevice};
use crate::error::Result;
use crate::locking::RelayLock;
use crate::processor::{RelayTask, TaskKind};
use crate::shutdown::HookId;
use log::{debug, error, info, warn};
use notifier::{Notifier, deliver};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Handle controlling one relay device. Clones share the same state.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

pub(crate) struct RelayInner {
    device: Arc<dyn RelayDevice>,
    thread_safe: bool,
    context: Arc<RelayContext>,
    lock: RelayLock,
    open: AtomicBool,
    disposed: AtomicBool,
    asynchronous: AtomicBool,
    listeners: ListenerSet<dyn RelayListener>,
    notifier: Mutex<Option<Notifier>>,
    hook: Mutex<Option<HookId>>,
}

impl Relay {
    /// Wraps `device`. `thread_safe` is the owning driver's capability.
    pub fn new(device: Arc<dyn RelayDevice>, thread_safe: bool, context: Arc<RelayContext>) -> Self {
        let name = device.name();
        let lock = RelayLock::new(name.as_str(), context.lock_dir());
        if !context.is_locking_enabled() {
            lock.disable();
        }

        let relay = Self {
            inner: Arc::new(RelayInner {
                device,
                thread_safe,
                context,
                lock,
                open: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                asynchronous: AtomicBool::new(false),
                listeners: ListenerSet::new(),
                notifier: Mutex::new(None),
                hook: Mutex::new(None),
            }),
        };

        let configured = relay.inner.context.device_parameters(&name);
        if let Some(Err(err)) = configured.map(|parameters| relay.set_parameters(parameters)) {
            warn!("Failed to apply configured parameters to {relay}: {err}");
        }
        relay
    }

    pub(crate) fn from_inner(inner: Arc<RelayInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<RelayInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn name(&self) -> String {
        self.inner.device.name()
    }

    pub fn device(&self) -> &Arc<dyn RelayDevice> {
        &self.inner.device
    }

    pub fn lock(&self) -> &RelayLock {
        &self.inner.lock
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.inner.context
    }

    pub fn is_thread_safe(&self) -> bool {
        self.inner.thread_safe
    }

    /// Whether both handles refer to the same relay.
    pub fn ptr_eq(&self, other: &Relay) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Opens the relay, waiting for listeners to be notified.
    pub fn open(&self) -> Result<bool> {
        self.open_with(false)
    }

    /// Opens the relay.
    ///
    /// Returns `Ok(true)` when the relay is open afterwards, including when it
    /// already was, and `Ok(false)` when the open was abandoned: the handle is
    /// disposed, the operation was cancelled or process shutdown is under way.
    /// With `asynchronous` set the open notification is queued without waiting
    /// for listeners.
    pub fn open_with(&self, asynchronous: bool) -> Result<bool> {
        let inner = &self.inner;

        if self.is_disposed() {
            debug!("Cannot open {self}, it has been already disposed");
            return Ok(false);
        }

        if inner
            .open
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Relay is already open {self}");
            return Ok(true);
        }

        if self.is_disposed() {
            inner.open.store(false, Ordering::SeqCst);
            return Ok(false);
        }

        inner.asynchronous.store(asynchronous, Ordering::SeqCst);

        let notifier = match Notifier::start(&self.name()) {
            Ok(notifier) => notifier,
            Err(err) => {
                inner.open.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };
        *self.notifier_slot() = Some(notifier);

        if let Err(err) = inner.lock.lock() {
            self.abandon_open();
            return Err(err);
        }

        let task = RelayTask::new(TaskKind::Open, inner.device.clone(), inner.thread_safe);
        if let Err(err) = task.process(inner.context.processor()) {
            self.release_lock();
            self.abandon_open();
            if err.is_cancelled() {
                debug!("Opening {self} has been interrupted: {err}");
                return Ok(false);
            }
            debug!("Relay error when opening {self}: {err}");
            return Err(err);
        }

        debug!("Relay is now open {}", self.name());

        match inner.context.hooks().add(self) {
            Ok(id) => *self.hook_slot() = Some(id),
            Err(err) => {
                debug!("Shutdown in progress, do not open {self}: {err}");
                self.close()?;
                return Ok(false);
            }
        }

        // Disposed while the driver was opening: give back what this open took.
        if self.is_disposed() {
            debug!("{self} has been disposed while opening");
            self.remove_hook();
            self.release_lock();
            self.abandon_open();
            return Ok(false);
        }

        self.notify(RelayEventType::Open, !asynchronous);
        Ok(true)
    }

    /// Closes the relay. Returns `Ok(true)` when it is closed afterwards.
    pub fn close(&self) -> Result<bool> {
        let inner = &self.inner;

        if inner
            .open
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Relay {} is already closed", self.name());
            return Ok(true);
        }

        debug!("Closing relay {}", self.name());

        let task = RelayTask::new(TaskKind::Close, inner.device.clone(), inner.thread_safe);
        if let Err(err) = task.process(inner.context.processor()) {
            inner.open.store(true, Ordering::SeqCst);
            if err.is_cancelled() {
                debug!("Closing {self} has been interrupted: {err}");
                return Ok(false);
            }
            return Err(err);
        }

        self.remove_hook();
        self.release_lock();
        self.notify(RelayEventType::Closed, false);
        self.stop_notifier();

        debug!("Relay {} has been closed", self.name());
        Ok(true)
    }

    /// Disposes the relay for good. Later calls do nothing.
    ///
    /// Listeners receive a closed and a disposed event even if the driver
    /// fails; its error is returned afterwards.
    pub fn dispose(&self) -> Result<()> {
        let inner = &self.inner;

        if inner
            .disposed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        inner.open.store(false, Ordering::SeqCst);

        info!("Disposing relay {}", self.name());

        let task = RelayTask::new(TaskKind::Dispose, inner.device.clone(), inner.thread_safe);
        let result = task.process(inner.context.processor());
        if let Err(err) = &result {
            error!("Driver failed to dispose {self}: {err}");
        }

        self.notify(RelayEventType::Closed, true);
        self.notify(RelayEventType::Disposed, true);

        self.remove_hook();
        self.stop_notifier();
        self.release_lock();

        debug!("Relay disposed {}", self.name());
        result
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Whether the last open queued its notification without waiting.
    pub fn is_asynchronous(&self) -> bool {
        self.inner.asynchronous.load(Ordering::SeqCst)
    }

    /// Whether the relay can be used right now.
    ///
    /// A disposed relay is never ready. In auto-open mode a closed relay is
    /// opened on the spot; two concurrent callers may both attempt it.
    pub fn is_ready(&self) -> bool {
        if self.is_disposed() {
            warn!("Cannot get relay state, {self} has been already disposed");
            return false;
        }

        if self.is_open() {
            return true;
        }

        if !self.inner.context.is_auto_open() {
            return false;
        }

        match self.open() {
            Ok(open) => open,
            Err(err) => {
                warn!("Automatic open of {self} failed: {err}");
                false
            }
        }
    }

    /// Forwards `parameters` to the device if it is configurable.
    pub fn set_parameters(&self, parameters: &Parameters) -> Result<()> {
        match self.inner.device.as_configurable() {
            Some(configurable) => configurable.set_parameters(parameters),
            None => {
                debug!("Relay device {} is not configurable", self.name());
                Ok(())
            }
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn RelayListener>) -> bool {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, listener: &Arc<dyn RelayListener>) -> bool {
        self.inner.listeners.remove(listener)
    }

    pub fn listeners(&self) -> Vec<Arc<dyn RelayListener>> {
        self.inner.listeners.snapshot()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    fn notify(&self, kind: RelayEventType, wait: bool) {
        let listeners = self.inner.listeners.snapshot();
        if listeners.is_empty() {
            return;
        }

        let what = match kind {
            RelayEventType::Open => "relay open",
            RelayEventType::Closed => "relay closed",
            RelayEventType::Disposed => "relay disposed",
        };
        let event = RelayEvent::new(kind, self.clone());
        let target = self
            .notifier_slot()
            .as_ref()
            .map(|notifier| (notifier.sender(), notifier.is_worker_thread()));

        deliver(target, wait, move || {
            notify_all(&listeners, what, |listener| match kind {
                RelayEventType::Open => listener.relay_open(&event),
                RelayEventType::Closed => listener.relay_closed(&event),
                RelayEventType::Disposed => listener.relay_disposed(&event),
            });
        });
    }

    fn abandon_open(&self) {
        self.inner.open.store(false, Ordering::SeqCst);
        self.stop_notifier();
    }

    fn stop_notifier(&self) {
        let notifier = self.notifier_slot().take();
        if let Some(notifier) = notifier {
            notifier.shutdown();
        }
    }

    fn release_lock(&self) {
        if let Err(err) = self.inner.lock.unlock() {
            warn!("Failed to unlock {self}: {err}");
        }
    }

    fn remove_hook(&self) {
        let hook = self.hook_slot().take();
        if let Some(id) = hook {
            self.inner.context.hooks().remove(id);
        }
    }

    fn notifier_slot(&self) -> MutexGuard<'_, Option<Notifier>> {
        self.inner
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn hook_slot(&self) -> MutexGuard<'_, Option<HookId>> {
        self.inner
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Display for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Relay {}", self.name())
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("name", &self.name())
            .field("open", &self.is_open())
            .field("disposed", &self.is_disposed())
            .field("thread_safe", &self.inner.thread_safe)
            .finish()
    }
}
