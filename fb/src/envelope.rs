//! Event envelope - one immutable unit of broadcast

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BusError;

/// Source used when the emitter does not name itself
pub const HOST_SOURCE: &str = "host";

/// One occurrence on the bus
///
/// Envelopes are built by the channel at emit time and handed to subscribers
/// by shared reference; nobody can mutate one after construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P = Value> {
    /// Event name/category
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload
    pub payload: P,
    /// Emitting party
    pub source: String,
    /// Milliseconds since the Unix epoch, assigned by the channel
    pub timestamp: i64,
}

impl<P> Envelope<P> {
    pub fn new(event_type: impl Into<String>, payload: P, source: impl Into<String>, timestamp: i64) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            source: source.into(),
            timestamp,
        }
    }

    pub fn is_type(&self, event_type: &str) -> bool {
        self.event_type == event_type
    }

    pub fn is_from(&self, source: &str) -> bool {
        self.source == source
    }

    /// Timestamp as a UTC datetime (None if out of range)
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

impl Envelope<Value> {
    /// Decode the JSON payload into a concrete type, keeping the metadata
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Envelope<T>, BusError> {
        let payload = serde_json::from_value(self.payload.clone()).map_err(|source| BusError::InvalidPayload {
            event_type: self.event_type.clone(),
            source,
        })?;
        Ok(Envelope {
            event_type: self.event_type.clone(),
            payload,
            source: self.source.clone(),
            timestamp: self.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_type_field() {
        let env = Envelope::new("HOST_MESSAGE", json!({"message": "hi"}), HOST_SOURCE, 1_700_000_000_000);
        let value = serde_json::to_value(&env).unwrap();

        assert_eq!(value["type"], "HOST_MESSAGE");
        assert_eq!(value["source"], "host");
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_decode_payload() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Ping {
            n: u32,
        }

        let env = Envelope::new("PING", json!({"n": 3}), "frag-a", 5);
        let typed: Envelope<Ping> = env.decode().unwrap();
        assert_eq!(typed.payload, Ping { n: 3 });
        assert_eq!(typed.source, "frag-a");
        assert_eq!(typed.timestamp, 5);

        let bad = Envelope::new("PING", json!("three"), "frag-a", 5);
        assert!(bad.decode::<Ping>().is_err());
    }

    #[test]
    fn test_datetime() {
        let env = Envelope::new("X", Value::Null, HOST_SOURCE, 0);
        assert_eq!(env.datetime().unwrap().timestamp(), 0);
        assert!(env.is_type("X"));
        assert!(env.is_from("host"));
    }
}
