//! fragbus - event channel and shared state for runtime-loaded fragments
//!
//! A host application loads independently built fragments at runtime. They
//! never link against each other or against the host, so they meet on this
//! bus instead.
//!
//! # Modules
//!
//! - [`channel`] - ordered, synchronous broadcast of [`Envelope`]s
//! - [`state`] - copy-on-write shared state with replay-latest subscriptions
//! - [`bus`] - [`MessageBus`], the facade over both
//! - [`events`] - typed event vocabulary ([`HostEvent`])
//! - [`registry`] - capability-scoped [`FragmentHandle`]s and the global slot
//!
//! # Usage
//!
//! ```rust
//! use fragbus::{MessageBus, events::kind};
//! use serde_json::json;
//!
//! let bus = MessageBus::shared();
//! bus.on(kind::HOST_MESSAGE, |e| {
//!     println!("{} says {}", e.source, e.payload["message"]);
//!     Ok(())
//! });
//! bus.emit(kind::HOST_MESSAGE, json!({"message": "hi", "timestamp": "now"}));
//! bus.set_state("theme", json!("light"));
//! assert_eq!(bus.state_value("theme"), Some(json!("light")));
//! ```

pub mod bus;
pub mod channel;
pub mod envelope;
pub mod error;
pub mod events;
pub mod registry;
pub mod sink;
pub mod state;
mod subscribers;

pub use bus::MessageBus;
pub use channel::{EventChannel, Filter};
pub use envelope::{Envelope, HOST_SOURCE};
pub use error::BusError;
pub use events::{DataResponse, HostEvent, HostMessage, RequestData, StateChanged, TypedEnvelope};
pub use registry::{Capabilities, FragmentHandle, Registry, global, install_global};
pub use sink::{CollectingSink, ErrorSink, HandlerFailure, TracingSink};
pub use state::{Snapshot, StateStore};
pub use subscribers::{Handler, SubscriptionId};
