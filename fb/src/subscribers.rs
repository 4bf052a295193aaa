//! Subscriber lists shared by the event channel and the state store
//!
//! The list is snapshotted before every delivery and handlers always run
//! outside the lock, so a handler may subscribe, unsubscribe or emit from
//! inside its own callback.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::sink::{ErrorSink, HandlerFailure};

/// Ids are unique across every list in the process
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle returned by every subscribe operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value (for logging)
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Callback invoked for each delivered item
pub type Handler<T> = Arc<dyn Fn(&T) -> eyre::Result<()> + Send + Sync>;

type Matcher<T> = Box<dyn Fn(&T) -> bool + Send + Sync>;

struct Subscriber<T> {
    id: SubscriptionId,
    matches: Matcher<T>,
    handler: Handler<T>,
    active: AtomicBool,
}

pub(crate) struct SubscriberList<T> {
    entries: RwLock<Vec<Arc<Subscriber<T>>>>,
}

impl<T> SubscriberList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn add<M, F>(&self, matches: M, handler: F) -> SubscriptionId
    where
        M: Fn(&T) -> bool + Send + Sync + 'static,
        F: Fn(&T) -> eyre::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        let subscriber = Arc::new(Subscriber {
            id,
            matches: Box::new(matches),
            handler: Arc::new(handler),
            active: AtomicBool::new(true),
        });
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
        debug!(%id, "SubscriberList::add: registered");
        id
    }

    /// Remove a subscriber; returns false if it was already gone
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter().position(|s| s.id == id) {
            Some(index) => {
                let removed = entries.remove(index);
                // An in-progress delivery holds its own snapshot; this flag makes it skip us.
                removed.active.store(false, Ordering::SeqCst);
                debug!(%id, "SubscriberList::remove: removed");
                true
            }
            None => {
                debug!(%id, "SubscriberList::remove: not registered");
                false
            }
        }
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|s| s.id == id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn snapshot(&self) -> Vec<Arc<Subscriber<T>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Deliver `item` to every matching subscriber registered before this call
    ///
    /// Returns the number of handlers invoked.
    pub(crate) fn deliver(&self, item: &T, context: &str, sink: &dyn ErrorSink) -> usize {
        let mut invoked = 0;
        for subscriber in self.snapshot() {
            if invoke(&subscriber, item, context, sink) {
                invoked += 1;
            }
        }
        invoked
    }

    /// Deliver `item` to a single subscriber (used for replay-on-subscribe)
    pub(crate) fn deliver_to(&self, id: SubscriptionId, item: &T, context: &str, sink: &dyn ErrorSink) -> bool {
        let target = self.snapshot().into_iter().find(|s| s.id == id);
        match target {
            Some(subscriber) => invoke(&subscriber, item, context, sink),
            None => false,
        }
    }
}

/// Run one handler with its failure contained; returns true if it was invoked
fn invoke<T>(subscriber: &Subscriber<T>, item: &T, context: &str, sink: &dyn ErrorSink) -> bool {
    if !subscriber.active.load(Ordering::SeqCst) {
        return false;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        if (subscriber.matches)(item) {
            Some((subscriber.handler)(item))
        } else {
            None
        }
    }));

    let (message, panicked) = match outcome {
        Ok(None) => return false,
        Ok(Some(Ok(()))) => return true,
        Ok(Some(Err(e))) => (format!("{e:#}"), false),
        Err(payload) => (panic_message(payload.as_ref()), true),
    };

    sink.report(HandlerFailure {
        subscription: subscriber.id,
        context: context.to_string(),
        message,
        panicked,
    });
    true
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
