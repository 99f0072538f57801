//! Messages flowing through the in-process broker.

use crate::envelope::Payload;
use std::sync::Arc;

/// One published event on one channel.
#[derive(Debug, Clone)]
pub struct Message {
    /// Target channel.
    pub channel: String,
    /// Broadcast name.
    pub event: String,
    /// Event payload, shared across all receivers.
    pub payload: Arc<Payload>,
}

impl Message {
    #[must_use]
    pub fn new(channel: impl Into<String>, event: impl Into<String>, payload: impl Into<Arc<Payload>>) -> Self {
        Self {
            channel: channel.into(),
            event: event.into(),
            payload: payload.into(),
        }
    }

    /// The payload as a JSON value, for handing to a frame encoder.
    #[must_use]
    pub fn payload_value(&self) -> serde_json::Value {
        serde_json::Value::Object(self.payload.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let mut payload = Payload::new();
        payload.insert("counter".into(), json!(3));

        let msg = Message::new("test-counter", "CounterUpdated", payload);
        assert_eq!(msg.channel, "test-counter");
        assert_eq!(msg.event, "CounterUpdated");
        assert_eq!(msg.payload_value(), json!({"counter": 3}));
    }

    #[test]
    fn test_receivers_share_the_payload() {
        let msg = Message::new("drivers", "RideRequest", Payload::new());
        let copy = msg.clone();
        assert!(Arc::ptr_eq(&msg.payload, &copy.payload));
    }
}
