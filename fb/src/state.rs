//! State Store - copy-on-write shared key/value state
//!
//! Every update produces a fresh [`Snapshot`]; snapshots already handed out
//! are never touched again. Updates are announced twice: to state
//! subscribers (which also get the latest snapshot the moment they
//! subscribe) and as a `STATE_CHANGED` event on the channel.
//!
//! A `set_state` issued from inside a state handler is queued behind the
//! snapshot being delivered, so every subscriber sees snapshots in update
//! order and the last one it sees is the current one.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::channel::EventChannel;
use crate::envelope::HOST_SOURCE;
use crate::events::kind;
use crate::sink::ErrorSink;
use crate::subscribers::{SubscriberList, SubscriptionId};

/// Immutable view of the whole shared state at one point in time
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot(Arc<BTreeMap<String, Value>>);

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// New snapshot equal to this one with `key` set; `self` is unchanged
    pub fn with(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = (*self.0).clone();
        next.insert(key.into(), value);
        Self(Arc::new(next))
    }

    /// True if both snapshots are the very same object
    pub fn same_as(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Render as a JSON object
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        Value::Object(map)
    }
}

struct PendingUpdate {
    snapshot: Snapshot,
    key: String,
    value: Value,
}

#[derive(Default)]
struct SnapshotQueue {
    delivering: bool,
    pending: VecDeque<PendingUpdate>,
}

/// Shared state with replay-latest subscriptions
pub struct StateStore {
    current: RwLock<Snapshot>,
    subscribers: SubscriberList<Snapshot>,
    queue: Mutex<SnapshotQueue>,
    channel: Arc<EventChannel<Value>>,
    sink: Arc<dyn ErrorSink>,
}

impl StateStore {
    /// Create an empty store announcing changes on `channel`
    pub fn new(channel: Arc<EventChannel<Value>>, sink: Arc<dyn ErrorSink>) -> Self {
        debug!("StateStore::new: called");
        Self {
            current: RwLock::new(Snapshot::empty()),
            subscribers: SubscriberList::new(),
            queue: Mutex::new(SnapshotQueue::default()),
            channel,
            sink,
        }
    }

    /// Set one key, publish the new snapshot, then emit `STATE_CHANGED`
    ///
    /// The new snapshot is current as soon as this returns. Called from
    /// outside any state handler, all subscribers have also seen it (and the
    /// event has been emitted) by then; called from inside one, both happen
    /// once the update in hand has been fully announced.
    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        debug!(%key, "StateStore::set_state: called");

        let deliver_now = {
            let mut queue = self.lock_queue();
            // Swapped under the queue lock so queue order matches update order.
            let snapshot = {
                let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
                let next = current.with(key.clone(), value.clone());
                *current = next.clone();
                next
            };
            queue.pending.push_back(PendingUpdate {
                snapshot,
                key: key.clone(),
                value,
            });
            if queue.delivering {
                debug!(%key, pending = queue.pending.len(), "StateStore::set_state: queued behind active delivery");
                false
            } else {
                queue.delivering = true;
                true
            }
        };

        if deliver_now {
            self.drain();
        }
    }

    fn drain(&self) {
        loop {
            let update = {
                let mut queue = self.lock_queue();
                match queue.pending.pop_front() {
                    Some(update) => update,
                    None => {
                        queue.delivering = false;
                        return;
                    }
                }
            };

            let notified = self.subscribers.deliver(&update.snapshot, "state", self.sink.as_ref());
            debug!(key = %update.key, notified, "StateStore::drain: snapshot published");

            self.channel.emit_from(
                kind::STATE_CHANGED,
                json!({ "key": update.key, "value": update.value }),
                HOST_SOURCE,
            );
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, SnapshotQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest snapshot
    pub fn current_state(&self) -> Snapshot {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Value of one key in the latest snapshot
    pub fn state_value(&self, key: &str) -> Option<Value> {
        self.current_state().get(key).cloned()
    }

    /// Subscribe to state; `handler` runs immediately with the current snapshot
    pub fn subscribe_state<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Snapshot) -> eyre::Result<()> + Send + Sync + 'static,
    {
        let id = self.subscribers.add(|_| true, handler);
        debug!(%id, "StateStore::subscribe_state: replaying latest snapshot");
        let current = self.current_state();
        self.subscribers
            .deliver_to(id, &current, "state replay", self.sink.as_ref());
        id
    }

    pub fn unsubscribe_state(&self, id: SubscriptionId) -> bool {
        debug!(%id, "StateStore::unsubscribe_state: called");
        self.subscribers.remove(id)
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscribers.contains(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{CollectingSink, TracingSink};
    use std::sync::Mutex;

    fn store() -> (Arc<EventChannel<Value>>, StateStore) {
        let channel = Arc::new(EventChannel::new());
        let store = StateStore::new(channel.clone(), Arc::new(TracingSink));
        (channel, store)
    }

    #[test]
    fn test_starts_empty() {
        let (_, store) = store();
        assert!(store.current_state().is_empty());
        assert_eq!(store.state_value("theme"), None);
    }

    #[test]
    fn test_set_state_visible_immediately() {
        let (_, store) = store();
        store.set_state("k", json!(1));
        store.set_state("k", json!(2));

        assert_eq!(store.current_state().get("k"), Some(&json!(2)));
        assert_eq!(store.state_value("k"), Some(json!(2)));
    }

    #[test]
    fn test_snapshots_are_not_mutated_retroactively() {
        let (_, store) = store();
        let seen: Arc<Mutex<Vec<Snapshot>>> = Arc::new(Mutex::new(Vec::new()));
        let writer = seen.clone();
        store.subscribe_state(move |s| {
            writer.lock().unwrap().push(s.clone());
            Ok(())
        });

        store.set_state("k", json!(1));
        store.set_state("k", json!(2));

        let seen = seen.lock().unwrap();
        // initial replay + two updates
        assert_eq!(seen.len(), 3);
        assert!(seen[0].is_empty());
        assert_eq!(seen[1].get("k"), Some(&json!(1)));
        assert_eq!(seen[2].get("k"), Some(&json!(2)));
        assert!(!seen[1].same_as(&seen[2]));
    }

    #[test]
    fn test_late_subscriber_gets_latest_first() {
        let (_, store) = store();
        store.set_state("userInfo", json!({"name": "Kumar Shan"}));
        store.set_state("theme", json!("light"));

        let first: Arc<Mutex<Option<Snapshot>>> = Arc::new(Mutex::new(None));
        let writer = first.clone();
        store.subscribe_state(move |s| {
            writer.lock().unwrap().get_or_insert_with(|| s.clone());
            Ok(())
        });

        let first = first.lock().unwrap().clone().unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.get("theme"), Some(&json!("light")));
    }

    #[test]
    fn test_set_state_emits_state_changed() {
        let (channel, store) = store();
        let events = Arc::new(Mutex::new(Vec::new()));
        let writer = events.clone();
        channel.on(kind::STATE_CHANGED, move |e| {
            writer.lock().unwrap().push((e.source.clone(), e.payload.clone()));
            Ok(())
        });

        store.set_state("theme", json!("dark"));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, "host");
        assert_eq!(events[0].1, json!({"key": "theme", "value": "dark"}));
    }

    #[test]
    fn test_state_handler_failure_is_contained() {
        let channel = Arc::new(EventChannel::new());
        let sink = Arc::new(CollectingSink::new());
        let store = StateStore::new(channel, sink.clone());

        store.subscribe_state(|s| {
            if s.is_empty() {
                Ok(())
            } else {
                Err(eyre::eyre!("cannot render state"))
            }
        });
        store.set_state("k", json!(true));

        assert_eq!(store.state_value("k"), Some(json!(true)));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.failures()[0].context, "state");
    }

    #[test]
    fn test_unsubscribe_state() {
        let (_, store) = store();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let id = store.subscribe_state(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        assert!(store.unsubscribe_state(id));
        assert!(!store.unsubscribe_state(id));
        store.set_state("k", json!(1));

        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_set_state_from_state_handler_keeps_update_order() {
        let (channel, store) = store();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let change_writer = changes.clone();
        channel.on(kind::STATE_CHANGED, move |e| {
            change_writer.lock().unwrap().push(e.payload["value"].clone());
            Ok(())
        });

        let bumper = Arc::new(store);
        let inner = Arc::downgrade(&bumper);
        bumper.subscribe_state(move |s| {
            if s.get("k") == Some(&json!(1)) {
                if let Some(store) = inner.upgrade() {
                    store.set_state("k", json!(2));
                }
            }
            Ok(())
        });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = seen.clone();
        bumper.subscribe_state(move |s| {
            writer.lock().unwrap().push(s.get("k").cloned());
            Ok(())
        });

        bumper.set_state("k", json!(1));

        assert_eq!(*seen.lock().unwrap(), vec![None, Some(json!(1)), Some(json!(2))]);
        assert_eq!(bumper.state_value("k"), Some(json!(2)));
        assert_eq!(*changes.lock().unwrap(), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_snapshot_to_value() {
        let snapshot = Snapshot::empty().with("a", json!(1)).with("b", json!("x"));
        assert_eq!(snapshot.to_value(), json!({"a": 1, "b": "x"}));
        assert_eq!(snapshot.keys().count(), 2);
    }
}
