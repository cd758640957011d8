//! Subscriber Registry
//!
//! Maps an [`EventKind`] to the callbacks registered for it. Callbacks for a
//! kind run in registration order. The same callback registered twice runs
//! twice; `off` removes every registration of it.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use super::events::{Event, EventKind};

/// A subscriber callback
///
/// Identity for [`SubscriberRegistry::off`] is the `Arc` allocation, so keep a
/// clone of the callback you registered if you intend to remove it.
pub type Callback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Wrap a closure as a [`Callback`]
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Ordered callback lists keyed by event kind
#[derive(Default)]
pub struct SubscriberRegistry {
    handlers: Mutex<HashMap<EventKind, Vec<Callback>>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a callback to the list for `kind`
    pub fn on(&self, kind: EventKind, callback: Callback) {
        tracing::trace!(event = %kind, "Subscriber registered");
        self.lock().entry(kind).or_default().push(callback);
    }

    /// Remove every registration of `callback` for `kind`
    ///
    /// Returns the number of registrations removed.
    pub fn off(&self, kind: &EventKind, callback: &Callback) -> usize {
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(kind) else {
            return 0;
        };

        let before = list.len();
        list.retain(|registered| !Arc::ptr_eq(registered, callback));
        let removed = before - list.len();

        // Clean up empty entries
        if list.is_empty() {
            handlers.remove(kind);
        }

        tracing::trace!(event = %kind, removed, "Subscriber removed");
        removed
    }

    /// Invoke every callback registered for the event's kind
    ///
    /// The list is snapshotted before invocation, so callbacks may register or
    /// remove subscribers without deadlocking; such changes apply from the
    /// next dispatch. A panicking callback is logged and skipped.
    ///
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&self, event: &Event) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Callback> = self.lock().get(&kind).cloned().unwrap_or_default();

        for callback in &snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                tracing::error!(event = %kind, "Subscriber panicked during dispatch");
            }
        }

        snapshot.len()
    }

    /// Number of registrations for `kind`
    pub fn subscriber_count(&self, kind: &EventKind) -> usize {
        self.lock().get(kind).map(Vec::len).unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventKind, Vec<Callback>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.lock();
        let counts: HashMap<String, usize> = handlers
            .iter()
            .map(|(kind, list)| (kind.to_string(), list.len()))
            .collect();
        f.debug_struct("SubscriberRegistry")
            .field("handlers", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Notification;

    fn recorder(log: &Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> Callback {
        let log = Arc::clone(log);
        callback(move |_| log.lock().unwrap().push(label))
    }

    fn notification(count: u64) -> Event {
        Event::Notification(Notification {
            count,
            timestamp: None,
        })
    }

    #[test]
    fn test_dispatch_preserves_registration_order() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.on(EventKind::Notification, recorder(&log, "A"));
        registry.on(EventKind::Notification, recorder(&log, "B"));

        assert_eq!(registry.dispatch(&notification(1)), 2);
        assert_eq!(*log.lock().unwrap(), vec!["A", "B"]);
    }

    #[test]
    fn test_dispatch_only_matching_kind() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.on(EventKind::Open, recorder(&log, "open"));
        registry.on(EventKind::Notification, recorder(&log, "notification"));

        registry.dispatch(&Event::Open);
        assert_eq!(*log.lock().unwrap(), vec!["open"]);
    }

    #[test]
    fn test_duplicate_registration_runs_twice() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cb = recorder(&log, "dup");

        registry.on(EventKind::Open, Arc::clone(&cb));
        registry.on(EventKind::Open, Arc::clone(&cb));

        registry.dispatch(&Event::Open);
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_off_removes_all_instances() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let cb = recorder(&log, "dup");
        let other = recorder(&log, "other");

        registry.on(EventKind::Open, Arc::clone(&cb));
        registry.on(EventKind::Open, Arc::clone(&other));
        registry.on(EventKind::Open, Arc::clone(&cb));

        assert_eq!(registry.off(&EventKind::Open, &cb), 2);
        assert_eq!(registry.subscriber_count(&EventKind::Open), 1);

        registry.dispatch(&Event::Open);
        assert_eq!(*log.lock().unwrap(), vec!["other"]);
    }

    #[test]
    fn test_off_unknown_kind() {
        let registry = SubscriberRegistry::new();
        let cb = callback(|_| {});
        assert_eq!(registry.off(&EventKind::Close, &cb), 0);
    }

    #[test]
    fn test_off_same_closure_body_different_arc() {
        let registry = SubscriberRegistry::new();
        let first = callback(|_| {});
        let second = callback(|_| {});

        registry.on(EventKind::Open, Arc::clone(&first));
        assert_eq!(registry.off(&EventKind::Open, &second), 0);
        assert_eq!(registry.subscriber_count(&EventKind::Open), 1);
    }

    #[test]
    fn test_callback_may_subscribe_during_dispatch() {
        let registry = Arc::new(SubscriberRegistry::new());
        let inner = Arc::clone(&registry);

        registry.on(
            EventKind::Open,
            callback(move |_| inner.on(EventKind::Close, callback(|_| {}))),
        );

        registry.dispatch(&Event::Open);
        assert_eq!(registry.subscriber_count(&EventKind::Close), 1);
    }

    #[test]
    fn test_panicking_callback_does_not_stop_dispatch() {
        let registry = SubscriberRegistry::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        registry.on(EventKind::Open, callback(|_| panic!("subscriber bug")));
        registry.on(EventKind::Open, recorder(&log, "after"));

        assert_eq!(registry.dispatch(&Event::Open), 2);
        assert_eq!(*log.lock().unwrap(), vec!["after"]);
    }
}
