//! Broadcast events of the ride-hailing app.
//!
//! Ride events go out on `ride.{rideId}` so the rider following that ride
//! receives them. New ride requests go to every online driver on `drivers`.

use crate::envelope::{ChannelRef, EventKind, Payload, PayloadShape};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

const RIDE_CHANNEL: &str = "ride.{rideId}";

fn ride_channel(ride_id: &str) -> Vec<ChannelRef> {
    vec![ChannelRef::new(RIDE_CHANNEL).with("rideId", ride_id)]
}

/// `2026-03-01T09:30:00.000Z`, used by pickup and completion events.
#[must_use]
pub fn iso_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `2026-03-01T09:30:00+00:00`, used by position updates.
#[must_use]
pub fn iso_offset(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// A numeric field, kept exactly as the client sent it.
///
/// Either a JSON number or a string that parses as one, such as `"25.50"`.
/// Echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Numeric(Value);

impl Numeric {
    /// `None` unless `value` is a number or a numeric string.
    #[must_use]
    pub fn parse(value: &Value) -> Option<Self> {
        match value {
            Value::Number(_) => Some(Self(value.clone())),
            Value::String(s) if s.trim().parse::<Number>().is_ok() => Some(Self(value.clone())),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_f64(value: f64) -> Option<Self> {
        Number::from_f64(value).map(|n| Self(Value::Number(n)))
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// The number as text. Strings come back verbatim.
    #[must_use]
    pub fn to_text(&self) -> String {
        match &self.0 {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl From<Number> for Numeric {
    fn from(n: Number) -> Self {
        Self(Value::Number(n))
    }
}

impl From<i64> for Numeric {
    fn from(n: i64) -> Self {
        Self(Value::from(n))
    }
}

/// Vehicle classes a rider can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Sedan,
    Suv,
    Bike,
}

impl VehicleType {
    pub const ALL: [&'static str; 3] = ["sedan", "suv", "bike"];

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sedan" => Some(VehicleType::Sedan),
            "suv" => Some(VehicleType::Suv),
            "bike" => Some(VehicleType::Bike),
            _ => None,
        }
    }
}

/// A ride as announced to drivers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ride {
    pub ride_id: String,
    pub pickup: String,
    pub destination: String,
    pub vehicle_type: VehicleType,
    pub price: Numeric,
    pub distance: Numeric,
    pub duration: Numeric,
    pub status: &'static str,
    pub passenger_name: String,
    pub passenger_contact: Option<String>,
}

/// A new ride, broadcast to all online drivers.
pub struct RideRequest;

impl EventKind for RideRequest {
    type Input = Ride;
    const NAME: &'static str = "RideRequest";

    fn channels(_: &Ride) -> Vec<ChannelRef> {
        vec![ChannelRef::fixed("drivers")]
    }

    fn shape() -> PayloadShape<Ride> {
        PayloadShape::Project(|ride| {
            let mut payload = Payload::new();
            payload.insert("ride".into(), serde_json::to_value(ride)?);
            Ok(Value::Object(payload))
        })
    }
}

/// The driver as shown to the rider once a ride is accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Driver {
    /// Whatever id the driver app sent, string or number.
    pub id: Value,
    pub name: String,
    pub phone: Option<String>,
    pub rating: Numeric,
    pub lat: Option<Numeric>,
    pub lng: Option<Numeric>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acceptance {
    pub ride_id: String,
    pub driver: Driver,
}

/// A driver accepted the ride.
pub struct DriverAccepted;

impl EventKind for DriverAccepted {
    type Input = Acceptance;
    const NAME: &'static str = "DriverAccepted";

    fn channels(input: &Acceptance) -> Vec<ChannelRef> {
        ride_channel(&input.ride_id)
    }

    fn shape() -> PayloadShape<Acceptance> {
        PayloadShape::Project(|input| {
            let mut payload = Payload::new();
            payload.insert("rideId".into(), Value::String(input.ride_id.clone()));
            payload.insert("driver".into(), serde_json::to_value(&input.driver)?);
            Ok(Value::Object(payload))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pickup {
    pub ride_id: String,
    pub driver_id: Value,
    pub lat: Option<Numeric>,
    pub lng: Option<Numeric>,
    pub picked_up_at: String,
}

/// The driver picked up the passenger.
pub struct DriverPickedUp;

impl EventKind for DriverPickedUp {
    type Input = Pickup;
    const NAME: &'static str = "DriverPickedUp";

    fn channels(input: &Pickup) -> Vec<ChannelRef> {
        ride_channel(&input.ride_id)
    }

    fn shape() -> PayloadShape<Pickup> {
        PayloadShape::Passthrough
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub ride_id: String,
    pub driver_id: Value,
    pub completed_at: String,
}

/// The ride is over.
pub struct RideCompleted;

impl EventKind for RideCompleted {
    type Input = Completion;
    const NAME: &'static str = "RideCompleted";

    fn channels(input: &Completion) -> Vec<ChannelRef> {
        ride_channel(&input.ride_id)
    }

    fn shape() -> PayloadShape<Completion> {
        PayloadShape::Passthrough
    }
}

/// A live position sample from the driver app.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub ride_id: String,
    pub lat: Numeric,
    pub lng: Numeric,
    pub bearing: Option<Numeric>,
    pub speed: Option<Numeric>,
    pub driver_id: Option<Value>,
    pub timestamp: String,
}

/// Live position of the vehicle serving a ride.
pub struct RidePositionUpdated;

impl EventKind for RidePositionUpdated {
    type Input = Position;
    const NAME: &'static str = "PositionUpdated";

    fn channels(input: &Position) -> Vec<ChannelRef> {
        ride_channel(&input.ride_id)
    }

    fn shape() -> PayloadShape<Position> {
        PayloadShape::Project(|p| {
            let number = |n: &Option<Numeric>| n.as_ref().map_or(Value::Null, |n| n.as_value().clone());

            let mut payload = Payload::new();
            payload.insert("rideId".into(), Value::String(p.ride_id.clone()));
            payload.insert("lat".into(), p.lat.as_value().clone());
            payload.insert("lng".into(), p.lng.as_value().clone());
            payload.insert("bearing".into(), number(&p.bearing));
            payload.insert("speed".into(), number(&p.speed));
            payload.insert("driverId".into(), p.driver_id.clone().unwrap_or(Value::Null));
            payload.insert("ts".into(), Value::String(p.timestamp.clone()));
            Ok(Value::Object(payload))
        })
    }
}

/// The demo counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counter {
    pub counter: i64,
}

/// Diagnostic broadcast used to check the realtime path end to end.
pub struct CounterUpdated;

impl EventKind for CounterUpdated {
    type Input = Counter;
    const NAME: &'static str = "CounterUpdated";

    fn channels(_: &Counter) -> Vec<ChannelRef> {
        vec![ChannelRef::fixed("test-counter")]
    }

    fn shape() -> PayloadShape<Counter> {
        PayloadShape::Project(|c| {
            let mut payload = Payload::new();
            payload.insert("counter".into(), Value::from(c.counter));
            Ok(Value::Object(payload))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub username: String,
    pub message: String,
}

/// A message in the public chat room.
pub struct MessageSent;

impl EventKind for MessageSent {
    type Input = ChatMessage;
    const NAME: &'static str = "message.sent";

    fn channels(_: &ChatMessage) -> Vec<ChannelRef> {
        vec![ChannelRef::fixed("chat")]
    }

    fn shape() -> PayloadShape<ChatMessage> {
        PayloadShape::Passthrough
    }
}
