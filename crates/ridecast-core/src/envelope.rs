//! Event envelopes.
//!
//! An [`EventKind`] describes one broadcast: its name, how to compute the
//! target channels from its input, and how to turn the input into a payload.
//! [`EnvelopeBuilder`] runs those pure functions and produces an immutable
//! [`Envelope`]. Building never performs I/O.

use crate::channel::{ChannelError, ChannelName, ChannelParams};
use crate::registry::ChannelRegistry;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// An ordered mapping of field name to JSON value.
pub type Payload = Map<String, Value>;

/// Errors raised while building an envelope.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A target channel could not be resolved.
    #[error("{event}: cannot resolve channel {template}: {source}")]
    Channel {
        event: &'static str,
        template: &'static str,
        #[source]
        source: ChannelError,
    },

    /// The input could not be serialized.
    #[error("{event}: payload is not serializable: {source}")]
    Serialize {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The payload serialized to something other than a JSON object.
    #[error("{event}: payload must be a JSON object")]
    NotAnObject { event: &'static str },

    /// The event kind named no channels.
    #[error("{event}: no target channels")]
    NoChannels { event: &'static str },
}

/// A reference to a registered channel pattern plus its placeholder values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    template: &'static str,
    params: ChannelParams,
}

impl ChannelRef {
    /// A channel with placeholders, filled in with [`ChannelRef::with`].
    #[must_use]
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            params: ChannelParams::new(),
        }
    }

    /// A fixed channel such as `drivers`.
    #[must_use]
    pub fn fixed(name: &'static str) -> Self {
        Self::new(name)
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name, value);
        self
    }

    #[must_use]
    pub fn template(&self) -> &'static str {
        self.template
    }

    #[must_use]
    pub fn params(&self) -> &ChannelParams {
        &self.params
    }
}

/// How an event kind turns its input into a payload.
pub enum PayloadShape<I> {
    /// The whole input, serialized verbatim.
    Passthrough,
    /// A projection of the input.
    Project(fn(&I) -> serde_json::Result<Value>),
}

/// One kind of broadcast event.
pub trait EventKind {
    /// What callers supply to build the event.
    type Input: Serialize;

    /// The broadcast name subscribers see.
    const NAME: &'static str;

    /// Target channels for this input.
    fn channels(input: &Self::Input) -> Vec<ChannelRef>;

    /// Payload shape for this kind.
    fn shape() -> PayloadShape<Self::Input>;
}

/// A named, channel-bound payload, ready to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    event: &'static str,
    channels: Vec<ChannelName>,
    payload: Arc<Payload>,
}

impl Envelope {
    #[must_use]
    pub fn event(&self) -> &'static str {
        self.event
    }

    #[must_use]
    pub fn channels(&self) -> &[ChannelName] {
        &self.channels
    }

    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Shared handle to the payload, cloned cheaply per channel.
    #[must_use]
    pub fn shared_payload(&self) -> Arc<Payload> {
        Arc::clone(&self.payload)
    }
}

/// Builds envelopes, resolving channels against a registry.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeBuilder<'a> {
    registry: &'a ChannelRegistry,
}

impl<'a> EnvelopeBuilder<'a> {
    #[must_use]
    pub fn new(registry: &'a ChannelRegistry) -> Self {
        Self { registry }
    }

    /// Build an envelope for event kind `E`.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if a channel cannot be resolved, the input
    /// does not serialize to a JSON object, or no channels are targeted.
    pub fn build<E: EventKind>(&self, input: &E::Input) -> Result<Envelope, ValidationError> {
        let refs = E::channels(input);
        if refs.is_empty() {
            return Err(ValidationError::NoChannels { event: E::NAME });
        }

        let mut channels = Vec::with_capacity(refs.len());
        for channel in refs {
            let name = self
                .registry
                .resolve(channel.template, &channel.params)
                .map_err(|source| ValidationError::Channel {
                    event: E::NAME,
                    template: channel.template,
                    source,
                })?;
            if !channels.contains(&name) {
                channels.push(name);
            }
        }

        let value = match E::shape() {
            PayloadShape::Passthrough => serde_json::to_value(input),
            PayloadShape::Project(project) => project(input),
        }
        .map_err(|source| ValidationError::Serialize { event: E::NAME, source })?;

        let Value::Object(payload) = value else {
            return Err(ValidationError::NotAnObject { event: E::NAME });
        };

        Ok(Envelope {
            event: E::NAME,
            channels,
            payload: Arc::new(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    #[serde(rename_all = "camelCase")]
    struct Note {
        ride_id: String,
        text: String,
    }

    struct Verbatim;

    impl EventKind for Verbatim {
        type Input = Note;
        const NAME: &'static str = "Verbatim";

        fn channels(input: &Note) -> Vec<ChannelRef> {
            vec![
                ChannelRef::new("ride.{rideId}").with("rideId", &input.ride_id),
                ChannelRef::fixed("drivers"),
            ]
        }

        fn shape() -> PayloadShape<Note> {
            PayloadShape::Passthrough
        }
    }

    struct TextOnly;

    impl EventKind for TextOnly {
        type Input = Note;
        const NAME: &'static str = "TextOnly";

        fn channels(_: &Note) -> Vec<ChannelRef> {
            vec![ChannelRef::fixed("chat")]
        }

        fn shape() -> PayloadShape<Note> {
            PayloadShape::Project(|note| Ok(json!({ "text": note.text })))
        }
    }

    struct Scalar;

    impl EventKind for Scalar {
        type Input = u32;
        const NAME: &'static str = "Scalar";

        fn channels(_: &u32) -> Vec<ChannelRef> {
            vec![ChannelRef::fixed("test-counter")]
        }

        fn shape() -> PayloadShape<u32> {
            PayloadShape::Passthrough
        }
    }

    fn note(ride_id: &str) -> Note {
        Note {
            ride_id: ride_id.into(),
            text: "hi".into(),
        }
    }

    #[test]
    fn test_passthrough_copies_input() {
        let registry = ChannelRegistry::ride_hailing().unwrap();
        let envelope = registry.envelopes().build::<Verbatim>(&note("r1")).unwrap();

        assert_eq!(envelope.event(), "Verbatim");
        let names: Vec<_> = envelope.channels().iter().map(ChannelName::as_str).collect();
        assert_eq!(names, ["ride.r1", "drivers"]);
        assert_eq!(Value::Object(envelope.payload().clone()), json!({"rideId": "r1", "text": "hi"}));
    }

    #[test]
    fn test_projection_selects_fields() {
        let registry = ChannelRegistry::ride_hailing().unwrap();
        let envelope = registry.envelopes().build::<TextOnly>(&note("r1")).unwrap();
        assert_eq!(Value::Object(envelope.payload().clone()), json!({"text": "hi"}));
    }

    #[test]
    fn test_payload_preserves_field_order() {
        let registry = ChannelRegistry::ride_hailing().unwrap();
        let envelope = registry.envelopes().build::<Verbatim>(&note("r1")).unwrap();
        let keys: Vec<_> = envelope.payload().keys().map(String::as_str).collect();
        assert_eq!(keys, ["rideId", "text"]);
    }

    #[test]
    fn test_unresolvable_channel_is_rejected() {
        let registry = ChannelRegistry::ride_hailing().unwrap();
        let err = registry.envelopes().build::<Verbatim>(&note("a.b")).unwrap_err();
        assert!(matches!(err, ValidationError::Channel { template: "ride.{rideId}", .. }));
    }

    #[test]
    fn test_unregistered_channel_is_rejected() {
        let registry = ChannelRegistry::new();
        let err = registry.envelopes().build::<TextOnly>(&note("r1")).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::Channel { source: ChannelError::UnknownPattern(_), .. }
        ));
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let registry = ChannelRegistry::ride_hailing().unwrap();
        let err = registry.envelopes().build::<Scalar>(&7).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnObject { event: "Scalar" }));
    }
}
