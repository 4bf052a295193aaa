//! Bus error types

use thiserror::Error;

/// Errors surfaced by the typed and capability-scoped layers of the bus
///
/// Raw emit/subscribe/state operations never fail; these come from payload
/// decoding and from fragment handles.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Fragment '{fragment}' lacks the '{capability}' capability")]
    CapabilityDenied {
        fragment: String,
        capability: &'static str,
    },

    #[error("Invalid payload for {event_type}: {source}")]
    InvalidPayload {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl BusError {
    /// Check if this error came from a capability check
    pub fn is_capability_denied(&self) -> bool {
        matches!(self, BusError::CapabilityDenied { .. })
    }
}
