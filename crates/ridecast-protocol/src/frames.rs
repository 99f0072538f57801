//! Frame types for the Ridecast subscriber protocol.
//!
//! Every frame is an object tagged with `type`. Field names are camelCase on
//! the wire so JavaScript clients can use them directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Error codes carried by [`Frame::Error`].
pub mod codes {
    /// Malformed frame or invalid channel name.
    pub const BAD_REQUEST: u16 = 4000;
    /// The channel registry denied the subscription.
    pub const FORBIDDEN: u16 = 4003;
    /// Unsubscribe for a channel the connection never joined.
    pub const NOT_SUBSCRIBED: u16 = 4004;
    /// Already subscribed to the channel.
    pub const CONFLICT: u16 = 4009;
    /// Per-connection or global limit reached.
    pub const LIMIT_REACHED: u16 = 4029;
    /// Anything else.
    pub const INTERNAL: u16 = 4500;
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Frame {
    /// Client handshake, optionally naming who the caller is.
    Connect {
        /// Protocol version spoken by the client.
        version: u8,
        /// Caller identity used for private channel authorization.
        ///
        /// Taken on the client's word. Nothing verifies it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        identity: Option<String>,
    },

    /// Sent by the server as soon as the socket opens.
    Connected {
        /// Server-assigned connection identifier.
        connection_id: String,
        /// Protocol version spoken by the server.
        version: u8,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },

    /// Join a channel.
    Subscribe {
        /// Request ID echoed in the ack or error.
        id: u64,
        /// Channel name, e.g. `ride.ride-42`.
        channel: String,
    },

    /// Leave a channel.
    Unsubscribe {
        /// Request ID echoed in the ack or error.
        id: u64,
        /// Channel name.
        channel: String,
    },

    /// A broadcast event delivered to a subscriber.
    Event {
        /// Channel the event was published on.
        channel: String,
        /// Broadcast name, e.g. `DriverAccepted`.
        event: String,
        /// Event payload.
        data: Value,
    },

    /// Acknowledgment of a request.
    Ack {
        /// ID of the acknowledged request.
        id: u64,
    },

    /// Error response.
    Error {
        /// ID of the failed request (0 if not applicable).
        id: u64,
        /// One of [`codes`].
        code: u16,
        /// Human-readable message.
        message: String,
    },

    /// Keepalive ping.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl Frame {
    /// The wire tag of this frame.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Connect { .. } => "connect",
            Frame::Connected { .. } => "connected",
            Frame::Subscribe { .. } => "subscribe",
            Frame::Unsubscribe { .. } => "unsubscribe",
            Frame::Event { .. } => "event",
            Frame::Ack { .. } => "ack",
            Frame::Error { .. } => "error",
            Frame::Ping { .. } => "ping",
            Frame::Pong { .. } => "pong",
        }
    }

    #[must_use]
    pub fn connect(identity: Option<String>) -> Self {
        Frame::Connect {
            version: crate::PROTOCOL_VERSION,
            identity,
        }
    }

    #[must_use]
    pub fn connected(connection_id: impl Into<String>, heartbeat: u32) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version: crate::PROTOCOL_VERSION,
            heartbeat,
        }
    }

    #[must_use]
    pub fn subscribe(id: u64, channel: impl Into<String>) -> Self {
        Frame::Subscribe {
            id,
            channel: channel.into(),
        }
    }

    #[must_use]
    pub fn unsubscribe(id: u64, channel: impl Into<String>) -> Self {
        Frame::Unsubscribe {
            id,
            channel: channel.into(),
        }
    }

    /// Create an event frame.
    #[must_use]
    pub fn event(channel: impl Into<String>, event: impl Into<String>, data: Value) -> Self {
        Frame::Event {
            channel: channel.into(),
            event: event.into(),
            data,
        }
    }

    #[must_use]
    pub fn ack(id: u64) -> Self {
        Frame::Ack { id }
    }

    #[must_use]
    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            id,
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }
}
