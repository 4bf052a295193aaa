//! Event Channel - in-process broadcast of envelopes
//!
//! Delivery is synchronous: by the time `emit` returns, every matching
//! subscriber has seen the envelope. Subscribers are called in registration
//! order. There is no backlog; an envelope emitted while nobody listens is
//! dropped.
//!
//! An emit issued from inside a handler is queued and dispatched after the
//! current envelope has reached every subscriber, so two dispatches never
//! interleave.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::envelope::{Envelope, HOST_SOURCE};
use crate::sink::{ErrorSink, TracingSink};
use crate::subscribers::{SubscriberList, SubscriptionId};

/// Which envelopes a subscription receives
pub enum Filter<P = Value> {
    /// Every envelope
    All,
    /// Envelopes whose `event_type` equals the given name
    Type(String),
    /// Envelopes whose `source` equals the given name
    Source(String),
    /// Arbitrary predicate
    Custom(Arc<dyn Fn(&Envelope<P>) -> bool + Send + Sync>),
}

impl<P> Filter<P> {
    pub fn by_type(event_type: impl Into<String>) -> Self {
        Filter::Type(event_type.into())
    }

    pub fn by_source(source: impl Into<String>) -> Self {
        Filter::Source(source.into())
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Envelope<P>) -> bool + Send + Sync + 'static,
    {
        Filter::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, envelope: &Envelope<P>) -> bool {
        match self {
            Filter::All => true,
            Filter::Type(t) => envelope.event_type == *t,
            Filter::Source(s) => envelope.source == *s,
            Filter::Custom(predicate) => predicate(envelope),
        }
    }
}

impl<P> Clone for Filter<P> {
    fn clone(&self) -> Self {
        match self {
            Filter::All => Filter::All,
            Filter::Type(t) => Filter::Type(t.clone()),
            Filter::Source(s) => Filter::Source(s.clone()),
            Filter::Custom(predicate) => Filter::Custom(predicate.clone()),
        }
    }
}

impl<P> fmt::Debug for Filter<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "All"),
            Filter::Type(t) => f.debug_tuple("Type").field(t).finish(),
            Filter::Source(s) => f.debug_tuple("Source").field(s).finish(),
            Filter::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

/// Millisecond clock that never steps backwards
#[derive(Debug, Default)]
struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    fn now_ms(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self.last.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}

struct DispatchQueue<P> {
    dispatching: bool,
    pending: VecDeque<Arc<Envelope<P>>>,
}

/// Broadcast channel with ordered, synchronous delivery
pub struct EventChannel<P = Value> {
    subscribers: SubscriberList<Envelope<P>>,
    queue: Mutex<DispatchQueue<P>>,
    clock: MonotonicClock,
    sink: Arc<dyn ErrorSink>,
}

impl<P> EventChannel<P> {
    /// Create a channel that reports handler failures through `tracing`
    pub fn new() -> Self {
        Self::with_sink(Arc::new(TracingSink))
    }

    /// Create a channel with a custom failure sink
    pub fn with_sink(sink: Arc<dyn ErrorSink>) -> Self {
        debug!("EventChannel::with_sink: creating channel");
        Self {
            subscribers: SubscriberList::new(),
            queue: Mutex::new(DispatchQueue {
                dispatching: false,
                pending: VecDeque::new(),
            }),
            clock: MonotonicClock::default(),
            sink,
        }
    }

    /// Emit an event on behalf of the host
    pub fn emit(&self, event_type: impl Into<String>, payload: P) {
        self.emit_from(event_type, payload, HOST_SOURCE);
    }

    /// Emit an event with an explicit source
    ///
    /// This is fire-and-forget: handler failures are reported to the sink,
    /// never to the caller.
    pub fn emit_from(&self, event_type: impl Into<String>, payload: P, source: impl Into<String>) {
        let event_type = event_type.into();
        let source = source.into();
        debug!(%event_type, %source, "EventChannel::emit_from: called");

        {
            let mut queue = self.lock_queue();
            // Stamped under the queue lock so delivery order matches timestamp order.
            let envelope = Envelope::new(event_type, payload, source, self.clock.now_ms());
            queue.pending.push_back(Arc::new(envelope));
            if queue.dispatching {
                debug!(pending = queue.pending.len(), "EventChannel::emit_from: queued behind active dispatch");
                return;
            }
            queue.dispatching = true;
        }

        self.drain();
    }

    fn drain(&self) {
        loop {
            let envelope = {
                let mut queue = self.lock_queue();
                match queue.pending.pop_front() {
                    Some(envelope) => envelope,
                    None => {
                        queue.dispatching = false;
                        return;
                    }
                }
            };

            let context = format!("event {}", envelope.event_type);
            let delivered = self.subscribers.deliver(&envelope, &context, self.sink.as_ref());
            debug!(event_type = %envelope.event_type, delivered, "EventChannel::drain: dispatched");
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, DispatchQueue<P>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a handler for every future envelope accepted by `filter`
    pub fn subscribe<F>(&self, filter: Filter<P>, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope<P>) -> eyre::Result<()> + Send + Sync + 'static,
        P: 'static,
    {
        debug!(?filter, "EventChannel::subscribe: called");
        self.subscribers.add(move |envelope| filter.matches(envelope), handler)
    }

    /// Subscribe to one event type
    pub fn on<F>(&self, event_type: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope<P>) -> eyre::Result<()> + Send + Sync + 'static,
        P: 'static,
    {
        self.subscribe(Filter::by_type(event_type), handler)
    }

    /// Subscribe to everything one source emits
    pub fn from_source<F>(&self, source: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope<P>) -> eyre::Result<()> + Send + Sync + 'static,
        P: 'static,
    {
        self.subscribe(Filter::by_source(source), handler)
    }

    /// Subscribe to every envelope
    pub fn all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Envelope<P>) -> eyre::Result<()> + Send + Sync + 'static,
        P: 'static,
    {
        self.subscribe(Filter::All, handler)
    }

    /// Remove a subscription. Removing twice is a no-op that returns false.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        debug!(%id, "EventChannel::unsubscribe: called");
        self.subscribers.remove(id)
    }

    pub fn is_subscribed(&self, id: SubscriptionId) -> bool {
        self.subscribers.contains(id)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<P> Default for EventChannel<P> {
    fn default() -> Self {
        Self::new()
    }
}
