//! Fragment registry and the process-wide bus slot
//!
//! Fragments are not part of the host's composition graph, so they cannot be
//! handed the bus through a constructor. The loader instead asks the
//! [`Registry`] for a [`FragmentHandle`] and passes it to the fragment's
//! initialization entry point. The handle is scoped: it stamps every emit
//! with the fragment's name and only allows what its [`Capabilities`] grant.
//!
//! For fragments that look the bus up themselves, [`install_global`] and
//! [`global`] expose one well-known slot.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::bus::MessageBus;
use crate::channel::Filter;
use crate::envelope::Envelope;
use crate::error::BusError;
use crate::events::{HostEvent, TypedEnvelope};
use crate::state::Snapshot;
use crate::subscribers::SubscriptionId;

static GLOBAL_BUS: OnceLock<Arc<MessageBus>> = OnceLock::new();

/// Publish `bus` in the process-wide slot
///
/// The first install wins; later calls return the instance already installed.
pub fn install_global(bus: Arc<MessageBus>) -> Arc<MessageBus> {
    if let Some(installed) = GLOBAL_BUS.get() {
        debug!("install_global: slot already filled, offered bus dropped");
        return installed.clone();
    }
    let installed = GLOBAL_BUS.get_or_init(|| {
        info!("install_global: message bus published");
        bus
    });
    installed.clone()
}

/// Look up the process-wide bus, if one was installed
pub fn global() -> Option<Arc<MessageBus>> {
    GLOBAL_BUS.get().cloned()
}

/// What a fragment handle is allowed to do
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Capabilities {
    pub emit: bool,
    pub subscribe: bool,
    pub read_state: bool,
    pub write_state: bool,
}

impl Capabilities {
    /// Everything allowed
    pub fn full() -> Self {
        Self {
            emit: true,
            subscribe: true,
            read_state: true,
            write_state: true,
        }
    }

    /// Listen and read, never publish or write
    pub fn observer() -> Self {
        Self {
            emit: false,
            subscribe: true,
            read_state: true,
            write_state: false,
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::full()
    }
}

/// Explicit owner of the bus, handing out scoped handles
#[derive(Clone)]
pub struct Registry {
    bus: Arc<MessageBus>,
}

impl Registry {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        debug!("Registry::new: called");
        Self { bus }
    }

    /// Registry over the process-wide bus, installing `fallback` if the slot is empty
    pub fn from_global_or(fallback: Arc<MessageBus>) -> Self {
        Self::new(install_global(fallback))
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Issue a handle for one fragment
    pub fn handle_for(&self, fragment: impl Into<String>, capabilities: Capabilities) -> FragmentHandle {
        let fragment = fragment.into();
        debug!(%fragment, ?capabilities, "Registry::handle_for: issuing handle");
        FragmentHandle {
            fragment,
            capabilities,
            bus: self.bus.clone(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Capability-scoped view of the bus given to one fragment
///
/// Cheap to clone; clones share the subscription list used by [`release`](Self::release).
#[derive(Clone)]
pub struct FragmentHandle {
    fragment: String,
    capabilities: Capabilities,
    bus: Arc<MessageBus>,
    subscriptions: Arc<Mutex<Vec<SubscriptionId>>>,
}

impl FragmentHandle {
    /// Name of the fragment this handle belongs to (used as event source)
    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn require(&self, granted: bool, capability: &'static str) -> Result<(), BusError> {
        if granted {
            Ok(())
        } else {
            debug!(fragment = %self.fragment, capability, "FragmentHandle: capability denied");
            Err(BusError::CapabilityDenied {
                fragment: self.fragment.clone(),
                capability,
            })
        }
    }

    fn track(&self, id: SubscriptionId) -> SubscriptionId {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id);
        id
    }

    // === Events ===

    /// Emit an event sourced from this fragment
    pub fn emit(&self, event_type: impl Into<String>, payload: Value) -> Result<(), BusError> {
        self.require(self.capabilities.emit, "emit")?;
        self.bus.emit_from(event_type, payload, self.fragment.clone());
        Ok(())
    }

    /// Emit a vocabulary event sourced from this fragment
    pub fn publish(&self, event: HostEvent) -> Result<(), BusError> {
        self.require(self.capabilities.emit, "emit")?;
        self.bus.publish_from(event, self.fragment.clone());
        Ok(())
    }

    pub fn subscribe<F>(&self, filter: Filter<Value>, handler: F) -> Result<SubscriptionId, BusError>
    where
        F: Fn(&Envelope<Value>) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.require(self.capabilities.subscribe, "subscribe")?;
        Ok(self.track(self.bus.subscribe(filter, handler)))
    }

    pub fn on<F>(&self, event_type: impl Into<String>, handler: F) -> Result<SubscriptionId, BusError>
    where
        F: Fn(&Envelope<Value>) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Filter::by_type(event_type), handler)
    }

    pub fn on_event<F>(&self, handler: F) -> Result<SubscriptionId, BusError>
    where
        F: Fn(&TypedEnvelope) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.require(self.capabilities.subscribe, "subscribe")?;
        Ok(self.track(self.bus.on_event(handler)))
    }

    /// Remove one of this handle's own subscriptions
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut owned = self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner);
        match owned.iter().position(|s| *s == id) {
            Some(index) => {
                owned.remove(index);
                self.bus.unsubscribe(id)
            }
            None => false,
        }
    }

    // === State ===

    pub fn current_state(&self) -> Result<Snapshot, BusError> {
        self.require(self.capabilities.read_state, "read-state")?;
        Ok(self.bus.current_state())
    }

    pub fn state_value(&self, key: &str) -> Result<Option<Value>, BusError> {
        self.require(self.capabilities.read_state, "read-state")?;
        Ok(self.bus.state_value(key))
    }

    pub fn subscribe_state<F>(&self, handler: F) -> Result<SubscriptionId, BusError>
    where
        F: Fn(&Snapshot) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.require(self.capabilities.read_state, "read-state")?;
        Ok(self.track(self.bus.subscribe_state(handler)))
    }

    pub fn set_state(&self, key: impl Into<String>, value: Value) -> Result<(), BusError> {
        self.require(self.capabilities.write_state, "write-state")?;
        self.bus.set_state(key, value);
        Ok(())
    }

    /// Drop every subscription made through this handle; returns how many were live
    pub fn release(&self) -> usize {
        let owned: Vec<SubscriptionId> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let removed = owned.into_iter().filter(|id| self.bus.unsubscribe(*id)).count();
        debug!(fragment = %self.fragment, removed, "FragmentHandle::release: called");
        removed
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
