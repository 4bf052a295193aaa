//! Host orchestrator
//!
//! The container side of the bus: seeds shared state, keeps a short log of
//! recent events for display, and answers fragments' data requests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{Local, Utc};
use fragbus::events::kind;
use fragbus::{DataResponse, Envelope, HostEvent, HostMessage, MessageBus, RequestData, SubscriptionId};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::HostConfig;

/// One event as shown in the host's message log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedMessage {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub payload: Value,
    pub timestamp: i64,
    /// Local wall-clock time, `HH:MM:SS`
    pub time_string: String,
}

impl LoggedMessage {
    fn from_envelope(envelope: &Envelope<Value>) -> Self {
        let time_string = envelope
            .datetime()
            .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
            .unwrap_or_default();
        Self {
            event_type: envelope.event_type.clone(),
            source: envelope.source.clone(),
            payload: envelope.payload.clone(),
            timestamp: envelope.timestamp,
            time_string,
        }
    }
}

/// Directory returned to fragments that send `REQUEST_DATA`
pub fn user_directory() -> Value {
    json!({
        "users": [
            { "id": 1, "name": "Alice Johnson", "department": "Engineering" },
            { "id": 2, "name": "Bob Smith", "department": "Marketing" },
            { "id": 3, "name": "Carol Davis", "department": "HR" }
        ]
    })
}

/// Host side of the bus
pub struct Host {
    bus: Arc<MessageBus>,
    log: Arc<Mutex<VecDeque<LoggedMessage>>>,
    loaded: Arc<Mutex<Vec<String>>>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl Host {
    /// Seed shared state and start listening
    pub fn attach(bus: Arc<MessageBus>, config: &HostConfig) -> Self {
        debug!(user = %config.user_name, theme = %config.theme, "Host::attach: called");

        bus.set_state("userInfo", json!({ "name": config.user_name, "role": config.user_role }));
        bus.set_state("theme", json!(config.theme));

        let log = Arc::new(Mutex::new(VecDeque::with_capacity(config.message_log_capacity)));
        let loaded = Arc::new(Mutex::new(Vec::new()));
        let capacity = config.message_log_capacity;

        let writer = log.clone();
        let all = bus.all(move |envelope| {
            let mut log = writer.lock().unwrap_or_else(PoisonError::into_inner);
            log.push_front(LoggedMessage::from_envelope(envelope));
            log.truncate(capacity);
            Ok(())
        });

        let loaded_writer = loaded.clone();
        let mfe_loaded = bus.on(kind::MFE_LOADED, move |envelope| {
            info!(payload = %envelope.payload, "Host: fragment loaded");
            if let Some(name) = envelope.payload.get("name").and_then(Value::as_str) {
                loaded_writer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(name.to_string());
            }
            Ok(())
        });

        // weak: the bus owns this handler
        let responder: Weak<MessageBus> = Arc::downgrade(&bus);
        let requests = bus.on(kind::REQUEST_DATA, move |envelope| {
            let request = envelope.decode::<RequestData>()?.payload;
            debug!(request_id = %request.request_id, from = %envelope.source, "Host: answering data request");
            if let Some(bus) = responder.upgrade() {
                bus.publish(HostEvent::DataResponse(DataResponse {
                    request_id: request.request_id,
                    data: user_directory(),
                }));
            }
            Ok(())
        });

        Self {
            bus,
            log,
            loaded,
            subscriptions: Mutex::new(vec![all, mfe_loaded, requests]),
        }
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Broadcast a `HOST_MESSAGE` to fragments
    pub fn send_message(&self, message: impl Into<String>) {
        let message = message.into();
        debug!(%message, "Host::send_message: called");
        self.bus.publish(HostEvent::HostMessage(HostMessage {
            message,
            timestamp: Utc::now().to_rfc3339(),
        }));
    }

    pub fn update_theme(&self, theme: impl Into<String>) {
        let theme = theme.into();
        debug!(%theme, "Host::update_theme: called");
        self.bus.set_state("theme", json!(theme));
    }

    /// Logged events, newest first
    pub fn messages(&self) -> Vec<LoggedMessage> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn clear_messages(&self) {
        debug!("Host::clear_messages: called");
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Fragment names announced through `MFE_LOADED`, in arrival order
    pub fn loaded_fragments(&self) -> Vec<String> {
        self.loaded.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Stop listening; returns how many subscriptions were removed
    pub fn detach(&self) -> usize {
        let owned: Vec<SubscriptionId> = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let removed = owned.into_iter().filter(|id| self.bus.unsubscribe(*id)).count();
        debug!(removed, "Host::detach: called");
        removed
    }
}

impl Drop for Host {
    fn drop(&mut self) {
        self.detach();
    }
}
