//! # ridecast-core
//!
//! The realtime dispatch core of Ridecast.
//!
//! - **Channel** - validated channel names and `ride.{rideId}` style patterns
//! - **Registry** - which channel patterns exist and who may subscribe
//! - **Envelope** - a named, channel-bound payload built from an event kind
//! - **Broker** - the pub/sub transport seam, with an in-process implementation
//! - **Dispatcher** - publishes envelopes to the broker with an explicit timeout
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  EventKind  │────▶│  Envelope   │────▶│ Dispatcher  │────▶│   Broker    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//!                            ▲                                       │
//!                     ┌─────────────┐                         ┌─────────────┐
//!                     │  Registry   │                         │   Router    │
//!                     └─────────────┘                         └─────────────┘
//! ```

pub mod broker;
pub mod channel;
pub mod dispatch;
pub mod envelope;
pub mod events;
pub mod message;
pub mod registry;
pub mod router;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use broker::{Ack, Broker, BrokerError, LocalBroker, Publication};
pub use channel::{ChannelError, ChannelName, ChannelParams, ChannelPattern};
pub use dispatch::{DispatchError, DispatchReport, Dispatcher, Receipt, DEFAULT_BROKER_TIMEOUT};
pub use envelope::{ChannelRef, Envelope, EnvelopeBuilder, EventKind, Payload, PayloadShape, ValidationError};
pub use message::Message;
pub use registry::{ChannelRegistry, ConfigurationError, Identity};
pub use router::{Router, RouterConfig, RouterError, RouterStats};

#[cfg(feature = "http-broker")]
pub use broker::HttpBroker;
