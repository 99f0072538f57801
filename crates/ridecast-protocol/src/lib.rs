//! # ridecast-protocol
//!
//! Frames exchanged between the Ridecast broker endpoint and realtime
//! subscribers (rider and driver apps).
//!
//! Two encodings share one frame model:
//!
//! - **Text** - one JSON object per WebSocket text message, the form browsers use
//! - **Binary** - length-prefixed MessagePack, for native clients
//!
//! ## Example
//!
//! ```rust
//! use ridecast_protocol::{codec, Frame};
//!
//! let frame = Frame::subscribe(1, "ride.r1");
//!
//! let text = codec::encode_text(&frame).unwrap();
//! assert_eq!(codec::decode_text(&text).unwrap(), frame);
//!
//! let binary = codec::encode_binary(&frame).unwrap();
//! assert_eq!(codec::decode_binary(&binary).unwrap(), frame);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode_binary, decode_text, encode_binary, encode_text, Encoded, Encoding, ProtocolError};
pub use frames::{codes, Frame};

/// Current protocol version, sent in `connected` frames.
pub const PROTOCOL_VERSION: u8 = 1;
