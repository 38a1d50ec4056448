use crate::Ring::Record::ErrorRecord;
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receives every event passed to [`EventDispatcher::emit`].
pub trait EventSubscriber: Send + Sync {
    fn on_event(&self, record: &ErrorRecord<'_>);
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct FnSubscriber<F>(F);

impl<F> EventSubscriber for FnSubscriber<F>
where
    F: Fn(&ErrorRecord<'_>) + Send + Sync,
{
    fn on_event(&self, record: &ErrorRecord<'_>) {
        (self.0)(record)
    }
}

/// An ordered list of subscribers that all see each emitted event.
///
/// Subscribers run in registration order on the emitting thread. A
/// subscriber may emit again (the list is read with a recursive read lock);
/// a `Producer` in the list drops such nested events through its
/// reentrancy guard.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<(SubscriberId, Arc<dyn EventSubscriber>)>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        id
    }

    pub fn subscribe_fn<F>(&self, f: F) -> SubscriberId
    where
        F: Fn(&ErrorRecord<'_>) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnSubscriber(f)))
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn emit(&self, record: &ErrorRecord<'_>) {
        let subscribers = self.subscribers.read_recursive();
        for (_, subscriber) in subscribers.iter() {
            subscriber.on_event(record);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Ring::Record::ErrorLevel;
    use parking_lot::Mutex;

    #[test]
    fn subscribers_run_in_registration_order() {
        let dispatcher = EventDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            dispatcher.subscribe_fn(move |_| seen.lock().push(tag));
        }

        dispatcher.emit(&ErrorRecord::new(ErrorLevel::Log, "x"));
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_subscriber() {
        let dispatcher = EventDispatcher::new();
        let hits = Arc::new(AtomicU64::new(0));
        let a = {
            let hits = hits.clone();
            dispatcher.subscribe_fn(move |_| {
                hits.fetch_add(1, Ordering::Relaxed);
            })
        };
        let _b = {
            let hits = hits.clone();
            dispatcher.subscribe_fn(move |_| {
                hits.fetch_add(10, Ordering::Relaxed);
            })
        };

        assert!(dispatcher.unsubscribe(a));
        assert!(!dispatcher.unsubscribe(a));
        dispatcher.emit(&ErrorRecord::new(ErrorLevel::Log, "x"));
        assert_eq!(hits.load(Ordering::Relaxed), 10);
        assert_eq!(dispatcher.len(), 1);
    }

    #[test]
    fn subscriber_may_emit_again() {
        let dispatcher = Arc::new(EventDispatcher::new());
        let depth = Arc::new(AtomicU64::new(0));
        {
            let inner = Arc::downgrade(&dispatcher);
            let depth = depth.clone();
            dispatcher.subscribe_fn(move |record| {
                if depth.fetch_add(1, Ordering::Relaxed) == 0 {
                    if let Some(d) = inner.upgrade() {
                        d.emit(record);
                    }
                }
            });
        }

        dispatcher.emit(&ErrorRecord::new(ErrorLevel::Warning, "outer"));
        assert_eq!(depth.load(Ordering::Relaxed), 2);
    }
}
