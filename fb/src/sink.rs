//! Error observability for subscriber callbacks
//!
//! A failing handler never reaches the emitter. Its failure is turned into a
//! [`HandlerFailure`] and handed to an [`ErrorSink`].

use std::sync::Mutex;

use tracing::error;

use crate::subscribers::SubscriptionId;

/// Description of one contained handler failure
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Subscription whose handler failed
    pub subscription: SubscriptionId,
    /// What was being delivered (e.g. `event STATE_CHANGED`, `state`)
    pub context: String,
    /// Rendered error or panic message
    pub message: String,
    /// True when the handler panicked rather than returning an error
    pub panicked: bool,
}

/// Destination for handler failures
pub trait ErrorSink: Send + Sync {
    fn report(&self, failure: HandlerFailure);
}

/// Default sink: logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, failure: HandlerFailure) {
        error!(
            subscription = %failure.subscription,
            context = %failure.context,
            panicked = failure.panicked,
            "subscriber handler failed: {}",
            failure.message
        );
    }
}

/// Sink that keeps every failure in memory
///
/// Useful for hosts that surface handler failures in their own UI, and for tests.
#[derive(Debug, Default)]
pub struct CollectingSink {
    failures: Mutex<Vec<HandlerFailure>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All failures reported so far, oldest first
    pub fn failures(&self) -> Vec<HandlerFailure> {
        match self.failures.lock() {
            Ok(failures) => failures.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.failures().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ErrorSink for CollectingSink {
    fn report(&self, failure: HandlerFailure) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure);
        }
    }
}
