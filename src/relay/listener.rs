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

use crate::error::Result;
use crate::relay::Relay;
use crate::worker::catch_panic;
use log::error;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEventType {
    Open,
    Closed,
    Disposed,
}

/// Lifecycle change of one handle.
#[derive(Debug, Clone)]
pub struct RelayEvent {
    kind: RelayEventType,
    relay: Relay,
}

impl RelayEvent {
    pub fn new(kind: RelayEventType, relay: Relay) -> Self {
        Self { kind, relay }
    }

    pub fn kind(&self) -> RelayEventType {
        self.kind
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }
}

/// Observer of handle lifecycle changes.
///
/// Errors and panics raised by a listener are logged and do not affect other
/// listeners or the operation that triggered the event.
pub trait RelayListener: Send + Sync {
    fn relay_open(&self, _event: &RelayEvent) -> Result<()> {
        Ok(())
    }

    fn relay_closed(&self, _event: &RelayEvent) -> Result<()> {
        Ok(())
    }

    fn relay_disposed(&self, _event: &RelayEvent) -> Result<()> {
        Ok(())
    }
}

/// Ordered listener registry. Duplicates are allowed.
pub struct ListenerSet<L: ?Sized> {
    listeners: RwLock<Vec<Arc<L>>>,
}

impl<L: ?Sized> ListenerSet<L> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<L>) -> bool {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
        true
    }

    /// Removes the first registration of `listener`.
    pub fn remove(&self, listener: &Arc<L>) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Point-in-time copy, so listeners may (un)register while being notified.
    pub fn snapshot(&self) -> Vec<Arc<L>> {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L: ?Sized> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ?Sized> fmt::Debug for ListenerSet<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

/// Calls `notify` on every listener, logging failures individually.
pub(crate) fn notify_all<L, F>(listeners: &[Arc<L>], what: &str, notify: F)
where
    L: ?Sized,
    F: Fn(&L) -> Result<()>,
{
    for (index, listener) in listeners.iter().enumerate() {
        match catch_panic(|| notify(&**listener)) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                error!("Notify {what}, exception when calling listener #{index}: {err}")
            }
            Err(panic) => {
                error!("Notify {what}, listener #{index} panicked: {panic}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RelayError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);

    impl Counter {
        fn bump(&self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn duplicates_are_kept_and_removed_one_at_a_time() {
        let set: ListenerSet<Counter> = ListenerSet::new();
        let a = Arc::new(Counter(AtomicUsize::new(0)));
        let b = Arc::new(Counter(AtomicUsize::new(0)));
        set.add(a.clone());
        set.add(b.clone());
        set.add(a.clone());
        assert_eq!(set.len(), 3);

        assert!(set.remove(&a));
        let remaining = set.snapshot();
        assert!(Arc::ptr_eq(&remaining[0], &b));
        assert!(Arc::ptr_eq(&remaining[1], &a));

        assert!(set.remove(&a));
        assert!(!set.remove(&a));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn failing_listener_does_not_stop_others() {
        let good = Arc::new(Counter(AtomicUsize::new(0)));
        let listeners = vec![good.clone(), good.clone(), good.clone()];
        let calls = AtomicUsize::new(0);

        notify_all(&listeners, "test", |listener| {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(RelayError::Driver("listener failed".to_string())),
                1 => panic!("listener panicked"),
                _ => listener.bump(),
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(good.0.load(Ordering::SeqCst), 1);
    }
}
