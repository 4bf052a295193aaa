//! Application-level event vocabulary
//!
//! The channel itself carries any `type` string with a JSON payload. Host and
//! fragments agree on the conventions below; [`HostEvent`] gives them a typed
//! shape so handlers can match exhaustively instead of comparing strings.
//!
//! | type            | payload                     |
//! |-----------------|-----------------------------|
//! | `MFE_LOADED`    | loader-defined              |
//! | `REQUEST_DATA`  | `{requestId}`               |
//! | `DATA_RESPONSE` | `{requestId, data}`         |
//! | `HOST_MESSAGE`  | `{message, timestamp}`      |
//! | `STATE_CHANGED` | `{key, value}`              |

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::envelope::Envelope;
use crate::error::BusError;

/// Event type names
pub mod kind {
    pub const MFE_LOADED: &str = "MFE_LOADED";
    pub const REQUEST_DATA: &str = "REQUEST_DATA";
    pub const DATA_RESPONSE: &str = "DATA_RESPONSE";
    pub const HOST_MESSAGE: &str = "HOST_MESSAGE";
    pub const STATE_CHANGED: &str = "STATE_CHANGED";
}

/// A fragment asks the host for data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    pub request_id: String,
}

/// The host answers a [`RequestData`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataResponse {
    pub request_id: String,
    pub data: Value,
}

/// Free-form message from the host to fragments
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostMessage {
    pub message: String,
    /// RFC 3339 time the message was composed
    pub timestamp: String,
}

/// Announcement of one shared-state update
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateChanged {
    pub key: String,
    pub value: Value,
}

/// Core event enum - the vocabulary spoken on the bus
#[derive(Clone, Debug, PartialEq)]
pub enum HostEvent {
    /// A fragment finished loading
    MfeLoaded(Value),
    RequestData(RequestData),
    DataResponse(DataResponse),
    HostMessage(HostMessage),
    StateChanged(StateChanged),
    /// Any type outside the vocabulary
    Other { event_type: String, payload: Value },
}

impl HostEvent {
    /// Get the event type name
    pub fn event_type(&self) -> &str {
        match self {
            HostEvent::MfeLoaded(_) => kind::MFE_LOADED,
            HostEvent::RequestData(_) => kind::REQUEST_DATA,
            HostEvent::DataResponse(_) => kind::DATA_RESPONSE,
            HostEvent::HostMessage(_) => kind::HOST_MESSAGE,
            HostEvent::StateChanged(_) => kind::STATE_CHANGED,
            HostEvent::Other { event_type, .. } => event_type,
        }
    }

    /// Wire payload for this event
    pub fn payload(&self) -> Value {
        match self {
            HostEvent::MfeLoaded(payload) => payload.clone(),
            HostEvent::RequestData(r) => json!({ "requestId": r.request_id }),
            HostEvent::DataResponse(r) => json!({ "requestId": r.request_id, "data": r.data }),
            HostEvent::HostMessage(m) => json!({ "message": m.message, "timestamp": m.timestamp }),
            HostEvent::StateChanged(s) => json!({ "key": s.key, "value": s.value }),
            HostEvent::Other { payload, .. } => payload.clone(),
        }
    }

    /// Split into the (type, payload) pair the channel carries
    pub fn into_parts(self) -> (String, Value) {
        let payload = self.payload();
        let event_type = match self {
            HostEvent::Other { event_type, .. } => event_type,
            other => other.event_type().to_string(),
        };
        (event_type, payload)
    }

    /// Decode a raw (type, payload) pair
    ///
    /// Known types with a malformed payload are an error; unknown types
    /// become [`HostEvent::Other`].
    pub fn decode(event_type: &str, payload: &Value) -> Result<Self, BusError> {
        fn parse<T: serde::de::DeserializeOwned>(event_type: &str, payload: &Value) -> Result<T, BusError> {
            serde_json::from_value(payload.clone()).map_err(|source| BusError::InvalidPayload {
                event_type: event_type.to_string(),
                source,
            })
        }

        let event = match event_type {
            kind::MFE_LOADED => HostEvent::MfeLoaded(payload.clone()),
            kind::REQUEST_DATA => HostEvent::RequestData(parse(event_type, payload)?),
            kind::DATA_RESPONSE => HostEvent::DataResponse(parse(event_type, payload)?),
            kind::HOST_MESSAGE => HostEvent::HostMessage(parse(event_type, payload)?),
            kind::STATE_CHANGED => HostEvent::StateChanged(parse(event_type, payload)?),
            other => HostEvent::Other {
                event_type: other.to_string(),
                payload: payload.clone(),
            },
        };
        Ok(event)
    }
}

/// An envelope whose payload has been decoded into the vocabulary
#[derive(Clone, Debug, PartialEq)]
pub struct TypedEnvelope {
    pub event: HostEvent,
    pub source: String,
    pub timestamp: i64,
}

impl TryFrom<&Envelope<Value>> for TypedEnvelope {
    type Error = BusError;

    fn try_from(envelope: &Envelope<Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            event: HostEvent::decode(&envelope.event_type, &envelope.payload)?,
            source: envelope.source.clone(),
            timestamp: envelope.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_data_wire_shape() {
        let event = HostEvent::RequestData(RequestData {
            request_id: "r1".to_string(),
        });

        assert_eq!(event.event_type(), "REQUEST_DATA");
        assert_eq!(event.payload(), json!({"requestId": "r1"}));
    }

    #[test]
    fn test_decode_known_types() {
        let decoded = HostEvent::decode(
            kind::DATA_RESPONSE,
            &json!({"requestId": "r9", "data": {"users": []}}),
        )
        .unwrap();

        match decoded {
            HostEvent::DataResponse(r) => {
                assert_eq!(r.request_id, "r9");
                assert_eq!(r.data, json!({"users": []}));
            }
            other => panic!("Expected DataResponse, got {:?}", other),
        }

        let decoded = HostEvent::decode(kind::STATE_CHANGED, &json!({"key": "theme", "value": "dark"})).unwrap();
        assert_eq!(
            decoded,
            HostEvent::StateChanged(StateChanged {
                key: "theme".to_string(),
                value: json!("dark"),
            })
        );
    }

    #[test]
    fn test_decode_malformed_known_type() {
        let result = HostEvent::decode(kind::REQUEST_DATA, &json!({"id": 1}));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_type_becomes_other() {
        let decoded = HostEvent::decode("CART_UPDATED", &json!({"items": 2})).unwrap();
        assert_eq!(decoded.event_type(), "CART_UPDATED");

        let (event_type, payload) = decoded.into_parts();
        assert_eq!(event_type, "CART_UPDATED");
        assert_eq!(payload, json!({"items": 2}));
    }

    #[test]
    fn test_typed_envelope_from_envelope() {
        let env = Envelope::new(
            kind::HOST_MESSAGE,
            json!({"message": "Hello from Host!", "timestamp": "2026-01-01T00:00:00Z"}),
            "host",
            42,
        );

        let typed = TypedEnvelope::try_from(&env).unwrap();
        assert_eq!(typed.source, "host");
        assert_eq!(typed.timestamp, 42);
        assert!(matches!(typed.event, HostEvent::HostMessage(ref m) if m.message == "Hello from Host!"));
    }
}
