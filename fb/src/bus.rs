//! Message Bus - the single facade over channel and state
//!
//! One `MessageBus` is created at startup and shared as `Arc<MessageBus>`.
//! Host code and every loaded fragment talk to the same instance.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::channel::{EventChannel, Filter};
use crate::envelope::{Envelope, HOST_SOURCE};
use crate::events::{HostEvent, TypedEnvelope};
use crate::sink::{ErrorSink, TracingSink};
use crate::state::{Snapshot, StateStore};
use crate::subscribers::SubscriptionId;

/// Event channel plus shared state, reachable by host and fragments alike
pub struct MessageBus {
    channel: Arc<EventChannel<Value>>,
    state: StateStore,
}

impl MessageBus {
    /// Create a bus that logs handler failures through `tracing`
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// Create a bus with a custom handler-failure sink
    pub fn with_sink(sink: Arc<dyn ErrorSink>) -> Self {
        debug!("MessageBus::with_sink: creating bus");
        let channel = Arc::new(EventChannel::with_sink(sink.clone()));
        let state = StateStore::new(channel.clone(), sink);
        Self { channel, state }
    }

    /// Create a bus wrapped in an Arc for shared ownership
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // === Events ===

    /// Emit an event with source `"host"`
    pub fn emit(&self, event_type: impl Into<String>, payload: Value) {
        self.channel.emit(event_type, payload);
    }

    /// Emit an event with an explicit source
    pub fn emit_from(&self, event_type: impl Into<String>, payload: Value, source: impl Into<String>) {
        self.channel.emit_from(event_type, payload, source);
    }

    /// Emit a vocabulary event with source `"host"`
    pub fn publish(&self, event: HostEvent) {
        self.publish_from(event, HOST_SOURCE);
    }

    /// Emit a vocabulary event with an explicit source
    pub fn publish_from(&self, event: HostEvent, source: impl Into<String>) {
        let (event_type, payload) = event.into_parts();
        self.channel.emit_from(event_type, payload, source);
    }

    pub fn subscribe<F>(&self, filter: Filter<Value>, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope<Value>) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.channel.subscribe(filter, handler)
    }

    /// Listen to one event type
    pub fn on<F>(&self, event_type: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope<Value>) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.channel.on(event_type, handler)
    }

    /// Listen to events from one source
    pub fn from_source<F>(&self, source: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope<Value>) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.channel.from_source(source, handler)
    }

    /// Listen to all events
    pub fn all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope<Value>) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.channel.all(handler)
    }

    /// Listen to all events, decoded into the typed vocabulary
    ///
    /// A malformed payload for a known type is reported as a handler failure.
    pub fn on_event<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TypedEnvelope) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.channel.all(move |envelope| {
            let typed = TypedEnvelope::try_from(envelope)?;
            handler(&typed)
        })
    }

    /// Remove an event or state subscription
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.channel.unsubscribe(id) || self.state.unsubscribe_state(id)
    }

    /// True if `id` is a live event or state subscription
    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.channel.is_subscribed(id) || self.state.is_subscribed(id)
    }

    /// Number of event subscribers (state subscribers not included)
    pub fn subscriber_count(&self) -> usize {
        self.channel.subscriber_count()
    }

    // === State ===

    pub fn set_state(&self, key: impl Into<String>, value: Value) {
        self.state.set_state(key, value);
    }

    pub fn current_state(&self) -> Snapshot {
        self.state.current_state()
    }

    pub fn state_value(&self, key: &str) -> Option<Value> {
        self.state.state_value(key)
    }

    /// Subscribe to state with replay of the latest snapshot
    pub fn subscribe_state<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Snapshot) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.state.subscribe_state(handler)
    }

    pub fn state_subscriber_count(&self) -> usize {
        self.state.subscriber_count()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{RequestData, kind};
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_bus_creation() {
        let bus = MessageBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.state_subscriber_count(), 0);
        assert!(bus.current_state().is_empty());
    }

    #[test]
    fn test_publish_typed_event() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = seen.clone();
        bus.on(kind::REQUEST_DATA, move |e| {
            writer.lock().unwrap().push(e.payload.clone());
            Ok(())
        });

        bus.publish_from(
            HostEvent::RequestData(RequestData {
                request_id: "r1".to_string(),
            }),
            "frag-a",
        );

        assert_eq!(*seen.lock().unwrap(), vec![json!({"requestId": "r1"})]);
    }

    #[test]
    fn test_on_event_decodes() {
        let bus = MessageBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = seen.clone();
        bus.on_event(move |typed| {
            let label = match &typed.event {
                HostEvent::StateChanged(s) => format!("state:{}", s.key),
                HostEvent::Other { event_type, .. } => format!("other:{}", event_type),
                other => format!("known:{}", other.event_type()),
            };
            writer.lock().unwrap().push(label);
            Ok(())
        });

        bus.set_state("theme", json!("light"));
        bus.emit("CUSTOM", json!({}));

        assert_eq!(*seen.lock().unwrap(), vec!["state:theme", "other:CUSTOM"]);
    }

    #[test]
    fn test_unsubscribe_handles_both_kinds() {
        let bus = MessageBus::new();
        let event_id = bus.all(|_| Ok(()));
        let state_id = bus.subscribe_state(|_| Ok(()));

        assert!(bus.is_subscribed(event_id));
        assert!(bus.is_subscribed(state_id));
        assert!(bus.unsubscribe(event_id));
        assert!(bus.unsubscribe(state_id));
        assert!(!bus.unsubscribe(event_id));
        assert!(!bus.unsubscribe(state_id));
    }

    #[test]
    fn test_state_and_event_streams_agree() {
        let bus = MessageBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        let state_log = order.clone();
        bus.subscribe_state(move |s| {
            state_log
                .lock()
                .unwrap()
                .push(format!("state:{}", s.get("k").cloned().unwrap_or(Value::Null)));
            Ok(())
        });
        let event_log = order.clone();
        bus.on(kind::STATE_CHANGED, move |e| {
            event_log.lock().unwrap().push(format!("event:{}", e.payload["value"]));
            Ok(())
        });

        bus.set_state("k", json!(7));

        assert_eq!(*order.lock().unwrap(), vec!["state:null", "state:7", "event:7"]);
    }
}
