//! # Event bus for lifecycle events.
//!
//! [`EventBus`] is a typed publish/subscribe registry keyed by [`EventKind`].
//! The driver owns one bus, and every [`Task`](crate::Task) owns another one; each
//! lifecycle transition is published to the driver bus and re-broadcast to the
//! bus of every affected task.
//!
//! ## Architecture
//! ```text
//! Publisher (driver loop / lifecycle call):
//!
//!   emit(Event) ──► EventBus (driver) ──► handler 1 ─► handler 2 ─► ...
//!              └──► EventBus (task A) ──► handler 1 ─► ...
//!              └──► SubscriberSet     ──► [queue S1] ─► worker S1 (async)
//! ```
//!
//! ## Rules
//! - **Synchronous**: `publish()` runs handlers inline, in registration order.
//! - **Lock-free dispatch**: the handler list is snapshotted, then the lock is released
//!   before any handler runs, so handlers may subscribe, unsubscribe or publish.
//! - **One-shot**: handlers registered with [`EventBus::subscribe_once`] are removed
//!   before they are invoked.
//! - **Isolation**: a panicking handler is caught and logged; remaining handlers still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::panic_message;

use super::event::{Event, EventKind};

/// Shared handler callable.
pub type Handler = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// Identifies one registration; used to unsubscribe it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Entry {
    id: SubscriptionId,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<Entry>>,
}

/// Synchronous publish/subscribe registry keyed by event kind.
///
/// ### Properties
/// - **Cheap**: an empty bus costs one mutex and an empty map.
/// - **Ordered**: handlers of one kind run in the order they were registered.
/// - **Re-entrant**: handlers may call back into the bus.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<Registry>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.insert(kind, Arc::new(handler), false)
    }

    /// Registers `handler` for the next event of `kind` only.
    pub fn subscribe_once<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.insert(kind, Arc::new(handler), true)
    }

    /// Removes registrations.
    ///
    /// - `kind` and `id`: removes that registration from that kind;
    /// - `kind` only: removes every handler of the kind;
    /// - `id` only: removes that registration wherever it is;
    /// - neither: removes everything.
    pub fn unsubscribe(&self, kind: Option<EventKind>, id: Option<SubscriptionId>) {
        let mut reg = self.lock();
        match (kind, id) {
            (Some(kind), Some(id)) => {
                if let Some(list) = reg.handlers.get_mut(&kind) {
                    list.retain(|e| e.id != id);
                }
            }
            (Some(kind), None) => {
                reg.handlers.remove(&kind);
            }
            (None, Some(id)) => {
                for list in reg.handlers.values_mut() {
                    list.retain(|e| e.id != id);
                }
            }
            (None, None) => reg.handlers.clear(),
        }
        reg.handlers.retain(|_, list| !list.is_empty());
    }

    /// Removes every registration.
    pub fn clear(&self) {
        self.unsubscribe(None, None);
    }

    /// Delivers `event` to every handler registered for its kind.
    pub fn publish(&self, event: &Event) {
        let handlers: Vec<Handler> = {
            let mut reg = self.lock();
            let Some(list) = reg.handlers.get_mut(&event.kind) else {
                return;
            };
            let snapshot = list.iter().map(|e| Arc::clone(&e.handler)).collect();
            list.retain(|e| !e.once);
            snapshot
        };

        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(event))) {
                tracing::warn!(
                    kind = event.kind.as_label(),
                    panic = %panic_message(payload.as_ref()),
                    "event handler panicked"
                );
            }
        }
    }

    /// Number of registrations for `kind`.
    pub fn len(&self, kind: EventKind) -> usize {
        self.lock().handlers.get(&kind).map_or(0, Vec::len)
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().handlers.is_empty()
    }

    fn insert(&self, kind: EventKind, handler: Handler, once: bool) -> SubscriptionId {
        let mut reg = self.lock();
        reg.next_id += 1;
        let id = SubscriptionId(reg.next_id);
        reg.handlers
            .entry(kind)
            .or_default()
            .push(Entry { id, once, handler });
        id
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Handlers run outside the lock, so a poisoned registry is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reg = self.lock();
        let total: usize = reg.handlers.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("handlers", &total)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter(bus: &EventBus, kind: EventKind) -> (Arc<AtomicUsize>, SubscriptionId) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let id = bus.subscribe(kind, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        (hits, id)
    }

    #[test]
    fn publish_reaches_only_matching_kind() {
        let bus = EventBus::new();
        let (starts, _) = counter(&bus, EventKind::Start);
        let (empties, _) = counter(&bus, EventKind::Empty);

        bus.publish(&Event::new(EventKind::Start));
        bus.publish(&Event::new(EventKind::Start));

        assert_eq!(starts.load(Ordering::SeqCst), 2);
        assert_eq!(empties.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn once_handlers_fire_a_single_time() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        bus.subscribe_once(EventKind::Yield, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(&Event::new(EventKind::Yield));
        bus.publish(&Event::new(EventKind::Yield));

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bus.len(EventKind::Yield), 0);
    }

    #[test]
    fn unsubscribe_variants() {
        let bus = EventBus::new();
        let (a, a_id) = counter(&bus, EventKind::Start);
        let (b, _) = counter(&bus, EventKind::Start);
        let (c, c_id) = counter(&bus, EventKind::Empty);

        bus.unsubscribe(Some(EventKind::Start), Some(a_id));
        bus.publish(&Event::new(EventKind::Start));
        assert_eq!(a.load(Ordering::SeqCst), 0);
        assert_eq!(b.load(Ordering::SeqCst), 1);

        bus.unsubscribe(None, Some(c_id));
        bus.publish(&Event::new(EventKind::Empty));
        assert_eq!(c.load(Ordering::SeqCst), 0);

        bus.unsubscribe(Some(EventKind::Start), None);
        assert_eq!(bus.len(EventKind::Start), 0);

        counter(&bus, EventKind::Paused);
        bus.clear();
        assert!(bus.is_empty());
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            bus.subscribe(EventKind::Start, move |_| log.lock().unwrap().push(i));
        }
        bus.publish(&Event::new(EventKind::Start));
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn panicking_handler_is_isolated() {
        let bus = EventBus::new();
        bus.subscribe(EventKind::Start, |_| panic!("boom"));
        let (after, _) = counter(&bus, EventKind::Start);

        bus.publish(&Event::new(EventKind::Start));
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_reenter_the_bus() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(EventKind::Start, move |_| {
            inner.clear();
        });
        bus.publish(&Event::new(EventKind::Start));
        assert!(bus.is_empty());
    }
}
