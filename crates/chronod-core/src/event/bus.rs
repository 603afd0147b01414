//! Synchronous pub/sub for `ExecutionEvent`, keyed by event kind with a
//! wildcard channel.
//!
//! Listeners run synchronously on the emitter's task, in registration
//! order, specific-kind listeners before wildcard listeners. A panicking
//! listener is isolated and logged; it never propagates to the emitter.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chronod_types::event::{EventKind, ExecutionEvent};

type Listener = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

struct Entry {
    id: u64,
    listener: Listener,
}

#[derive(Default)]
struct ListenerTable {
    by_kind: HashMap<EventKind, Vec<Entry>>,
    wildcard: Vec<Entry>,
}

/// Multi-listener event bus.
pub struct EventBus {
    table: Arc<Mutex<ListenerTable>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            table: Arc::new(Mutex::new(ListenerTable::default())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a listener for one event kind.
    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&ExecutionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.insert(Some(kind), Arc::new(listener))
    }

    /// Register a wildcard listener that receives every event.
    pub fn on_any(&self, listener: impl Fn(&ExecutionEvent) + Send + Sync + 'static) -> Subscription {
        self.insert(None, Arc::new(listener))
    }

    fn insert(&self, kind: Option<EventKind>, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut table = lock(&self.table);
        let entry = Entry { id, listener };
        match kind {
            Some(kind) => table.by_kind.entry(kind).or_default().push(entry),
            None => table.wildcard.push(entry),
        }
        Subscription {
            table: Arc::downgrade(&self.table),
            kind,
            id,
        }
    }

    /// Deliver an event to specific-kind listeners, then wildcard
    /// listeners. Listener lists are snapshotted so no lock is held
    /// while listeners run.
    pub fn emit(&self, event: &ExecutionEvent) {
        let snapshot: Vec<Listener> = {
            let table = lock(&self.table);
            let specific = table
                .by_kind
                .get(&event.kind())
                .into_iter()
                .flat_map(|entries| entries.iter());
            specific
                .chain(table.wildcard.iter())
                .map(|entry| entry.listener.clone())
                .collect()
        };

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                tracing::warn!(kind = %event.kind(), "event listener panicked");
            }
        }
    }

    /// Drop every subscription.
    pub fn remove_all_listeners(&self) {
        let mut table = lock(&self.table);
        table.by_kind.clear();
        table.wildcard.clear();
    }

    pub fn listener_count(&self) -> usize {
        let table = lock(&self.table);
        table.by_kind.values().map(Vec::len).sum::<usize>() + table.wildcard.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

fn lock(table: &Mutex<ListenerTable>) -> MutexGuard<'_, ListenerTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle returned by [`EventBus::on`]/[`EventBus::on_any`]. Dropping it
/// (or calling [`Subscription::unsubscribe`]) detaches the listener.
pub struct Subscription {
    table: Weak<Mutex<ListenerTable>>,
    kind: Option<EventKind>,
    id: u64,
}

impl Subscription {
    /// Detach the listener; it receives no further events.
    pub fn unsubscribe(self) {
        // Removal happens in Drop.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut table = lock(&table);
        match self.kind {
            Some(kind) => {
                if let Some(entries) = table.by_kind.get_mut(&kind) {
                    entries.retain(|entry| entry.id != self.id);
                }
            }
            None => table.wildcard.retain(|entry| entry.id != self.id),
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex as StdMutex;

    fn start_event(job_id: &str) -> ExecutionEvent {
        ExecutionEvent::Start {
            job_id: job_id.to_string(),
            run_id: "run_0_aaaaaaaaa".to_string(),
            timestamp: Utc::now(),
            attempt: 1,
        }
    }

    fn success_event(job_id: &str) -> ExecutionEvent {
        ExecutionEvent::Success {
            job_id: job_id.to_string(),
            run_id: "run_0_aaaaaaaaa".to_string(),
            timestamp: Utc::now(),
            attempt: 1,
            duration: 5,
        }
    }

    #[test]
    fn delivers_to_matching_kind_only() {
        let bus = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = bus.on(EventKind::Start, move |event| {
            sink.lock().unwrap().push(event.kind());
        });

        bus.emit(&start_event("a"));
        bus.emit(&success_event("a"));

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Start]);
    }

    #[test]
    fn wildcard_receives_every_event() {
        let bus = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));

        let sink = seen.clone();
        let _sub = bus.on_any(move |event| sink.lock().unwrap().push(event.kind()));

        bus.emit(&start_event("a"));
        bus.emit(&success_event("a"));
        bus.emit(&start_event("b"));

        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn specific_listeners_run_before_wildcard() {
        let bus = EventBus::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        let sink = order.clone();
        let _wild = bus.on_any(move |_| sink.lock().unwrap().push("wildcard"));
        let sink = order.clone();
        let _spec = bus.on(EventKind::Start, move |_| sink.lock().unwrap().push("specific"));

        bus.emit(&start_event("a"));
        assert_eq!(*order.lock().unwrap(), vec!["specific", "wildcard"]);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(StdMutex::new(Vec::new()));

        for label in ["first", "second", "third"] {
            let sink = order.clone();
            // Leak the subscriptions so they outlive the loop.
            std::mem::forget(bus.on(EventKind::Start, move |_| {
                sink.lock().unwrap().push(label);
            }));
        }

        bus.emit(&start_event("a"));
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(StdMutex::new(0u32));

        let sink = count.clone();
        let sub = bus.on_any(move |_| *sink.lock().unwrap() += 1);

        bus.emit(&start_event("a"));
        sub.unsubscribe();
        bus.emit(&start_event("a"));

        assert_eq!(*count.lock().unwrap(), 1);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn dropping_subscription_detaches_listener() {
        let bus = EventBus::new();
        {
            let _sub = bus.on(EventKind::Retry, |_| {});
            assert_eq!(bus.listener_count(), 1);
        }
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn remove_all_listeners_clears_everything() {
        let bus = EventBus::new();
        std::mem::forget(bus.on(EventKind::Start, |_| {}));
        std::mem::forget(bus.on_any(|_| {}));
        assert_eq!(bus.listener_count(), 2);

        bus.remove_all_listeners();
        assert_eq!(bus.listener_count(), 0);

        // Emitting afterwards is a no-op, not a panic.
        bus.emit(&start_event("a"));
    }

    #[test]
    fn panicking_listener_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let reached = Arc::new(StdMutex::new(false));

        let _bad = bus.on_any(|_| panic!("listener bug"));
        let sink = reached.clone();
        let _good = bus.on_any(move |_| *sink.lock().unwrap() = true);

        bus.emit(&start_event("a"));
        assert!(*reached.lock().unwrap());
    }

    #[test]
    fn wildcard_count_matches_sum_of_per_kind_emissions() {
        let bus = EventBus::new();
        let wildcard_count = Arc::new(StdMutex::new(0u32));
        let per_kind_count = Arc::new(StdMutex::new(0u32));

        let sink = wildcard_count.clone();
        let _wild = bus.on_any(move |_| *sink.lock().unwrap() += 1);
        let sink = per_kind_count.clone();
        let _start = bus.on(EventKind::Start, move |_| *sink.lock().unwrap() += 1);
        let sink = per_kind_count.clone();
        let _success = bus.on(EventKind::Success, move |_| *sink.lock().unwrap() += 1);

        bus.emit(&start_event("a"));
        bus.emit(&success_event("a"));
        bus.emit(&start_event("b"));

        assert_eq!(*wildcard_count.lock().unwrap(), 3);
        assert_eq!(*per_kind_count.lock().unwrap(), 3);
    }
}
