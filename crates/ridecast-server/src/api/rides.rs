//! Ride lifecycle endpoints.
//!
//! There is no ride state machine: each call is handled on its own, so an
//! accept before a create, or the same accept twice, is dispatched as asked.

use super::{
    envelope, notify, payload_data, persist, respond, validated, DeliveryOutcome, DeliveryPolicy, JsonObject, Trace,
};
use crate::error::ApiError;
use crate::relay::{coordinate, BookingAcceptance, NewBooking};
use crate::state::AppState;
use crate::validation::Fields;
use axum::extract::{MatchedPath, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use ridecast_core::events::{
    iso_millis, iso_offset, Acceptance, Completion, Driver, DriverAccepted, DriverPickedUp, Numeric, Pickup,
    Position, Ride, RideCompleted, RidePositionUpdated, RideRequest, VehicleType,
};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

const POLICY: DeliveryPolicy = DeliveryPolicy::BestEffort;

/// Shown when the accepting driver sends no rating.
const DEFAULT_DRIVER_RATING: f64 = 4.8;

fn new_ride_id() -> String {
    format!("ride-{}", Uuid::new_v4().simple())
}

fn default_rating() -> Numeric {
    Numeric::from_f64(DEFAULT_DRIVER_RATING).unwrap_or_else(|| Numeric::from(5))
}

fn to_data<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::Internal(e.to_string()))
}

/// `POST /api/rides`
pub(super) async fn create(
    State(state): State<Arc<AppState>>,
    path: MatchedPath,
    JsonObject(body): JsonObject,
) -> Result<Response, ApiError> {
    let endpoint = path.as_str();

    let mut fields = Fields::new(&body);
    let passenger_id = fields.required_integer("passengerId");
    let passenger_name = fields.required_string("passengerName");
    let passenger_phone = fields.optional_string("passengerPhone");
    let pickup = fields.required_string("pickup");
    let pickup_lat = fields.optional_number("pickupLat");
    let pickup_lng = fields.optional_number("pickupLng");
    let destination = fields.required_string("destination");
    let destination_lat = fields.optional_number("destinationLat");
    let destination_lng = fields.optional_number("destinationLng");
    let vehicle_type = fields
        .required_choice("vehicleType", &VehicleType::ALL)
        .and_then(|v| VehicleType::parse(&v));
    let price = fields.required_number("price");
    let distance = fields.required_number("distance");
    let duration = fields.required_number("duration");
    let price_breakdown = fields.optional_list("priceBreakdown");

    let (
        Some(passenger_id),
        Some(passenger_name),
        Some(pickup),
        Some(destination),
        Some(vehicle_type),
        Some(price),
        Some(distance),
        Some(duration),
    ) = (
        passenger_id,
        passenger_name,
        pickup,
        destination,
        vehicle_type,
        price,
        distance,
        duration,
    )
    else {
        return validated(endpoint, Err(fields.into_errors()));
    };
    validated(endpoint, fields.finish())?;

    let ride = Ride {
        ride_id: new_ride_id(),
        pickup,
        destination,
        vehicle_type,
        price,
        distance,
        duration,
        status: "pending",
        passenger_name,
        passenger_contact: passenger_phone,
    };
    let envelope = envelope::<RideRequest>(&state.registry, endpoint, &ride)?;

    let booking = NewBooking {
        ride_id: ride.ride_id.clone(),
        passenger_id,
        passenger_name: ride.passenger_name.clone(),
        passenger_phone: ride.passenger_contact.clone(),
        vehicle_type,
        pickup_location: ride.pickup.clone(),
        pickup_lat: coordinate(pickup_lat.as_ref()),
        pickup_lng: coordinate(pickup_lng.as_ref()),
        destination_location: ride.destination.clone(),
        destination_lat: coordinate(destination_lat.as_ref()),
        destination_lng: coordinate(destination_lng.as_ref()),
        distance: ride.distance.clone(),
        duration: ride.duration.clone(),
        price: ride.price.clone(),
        price_breakdown,
    };

    let trace = Trace::ride(&ride.ride_id);
    let persisted = persist("create", trace, state.relay.create_ride(&booking)).await;
    let notified = notify(&state, &envelope, trace).await.is_ok();

    Ok(respond(
        POLICY,
        StatusCode::CREATED,
        "Ride created successfully",
        to_data(&ride)?,
        DeliveryOutcome {
            notified,
            persisted: Some(persisted),
        },
    ))
}

/// `GET /api/rides/{rideId}`
///
/// Rides are not stored here, so this answers with a fixed demo ride.
pub(super) async fn show(Path(ride_id): Path<String>) -> Response {
    Json(json!({
        "success": true,
        "data": {
            "rideId": ride_id,
            "status": "active",
            "driver": {
                "name": "Demo Driver",
                "vehicle": "Sedan",
                "rating": DEFAULT_DRIVER_RATING,
            },
        },
    }))
    .into_response()
}

/// `POST /api/rides/{rideId}/accept`
pub(super) async fn accept(
    State(state): State<Arc<AppState>>,
    Path(ride_id): Path<String>,
    path: MatchedPath,
    JsonObject(body): JsonObject,
) -> Result<Response, ApiError> {
    let endpoint = path.as_str();

    let mut fields = Fields::new(&body);
    let driver_id = fields.required_any("driverId");
    let driver_name = fields.required_string("driverName");
    let driver_phone = fields.optional_string("driverPhone");
    let driver_rating = fields.optional_number("driverRating");
    let lat = fields.optional_number("lat");
    let lng = fields.optional_number("lng");

    let (Some(driver_id), Some(driver_name)) = (driver_id, driver_name) else {
        return validated(endpoint, Err(fields.into_errors()));
    };
    validated(endpoint, fields.finish())?;

    let acceptance = Acceptance {
        ride_id,
        driver: Driver {
            id: driver_id,
            name: driver_name,
            phone: driver_phone,
            rating: driver_rating.unwrap_or_else(default_rating),
            lat,
            lng,
        },
    };
    let envelope = envelope::<DriverAccepted>(&state.registry, endpoint, &acceptance)?;

    let booking = BookingAcceptance {
        driver_id: acceptance.driver.id.clone(),
        driver_name: acceptance.driver.name.clone(),
        driver_phone: acceptance.driver.phone.clone(),
    };
    let trace = Trace::ride(&acceptance.ride_id).driver(Some(&acceptance.driver.id));
    let persisted = persist(
        "accept",
        trace,
        state.relay.accept_ride(&acceptance.ride_id, &booking),
    )
    .await;
    let notified = notify(&state, &envelope, trace).await.is_ok();

    Ok(respond(
        POLICY,
        StatusCode::OK,
        "Ride accepted successfully",
        json!({
            "rideId": acceptance.ride_id,
            "driver": to_data(&acceptance.driver)?,
            "status": "accepted",
        }),
        DeliveryOutcome {
            notified,
            persisted: Some(persisted),
        },
    ))
}

/// `POST /api/rides/{rideId}/pickup`
pub(super) async fn pickup(
    State(state): State<Arc<AppState>>,
    Path(ride_id): Path<String>,
    path: MatchedPath,
    JsonObject(body): JsonObject,
) -> Result<Response, ApiError> {
    let endpoint = path.as_str();

    let mut fields = Fields::new(&body);
    let driver_id = fields.required_any("driverId");
    let lat = fields.optional_number("lat");
    let lng = fields.optional_number("lng");

    let Some(driver_id) = driver_id else {
        return validated(endpoint, Err(fields.into_errors()));
    };
    validated(endpoint, fields.finish())?;

    let pickup = Pickup {
        ride_id,
        driver_id,
        lat,
        lng,
        picked_up_at: iso_millis(Utc::now()),
    };
    let envelope = envelope::<DriverPickedUp>(&state.registry, endpoint, &pickup)?;

    let trace = Trace::ride(&pickup.ride_id).driver(Some(&pickup.driver_id));
    let persisted = persist("pickup", trace, state.relay.pickup_ride(&pickup.ride_id)).await;
    let notified = notify(&state, &envelope, trace).await.is_ok();

    Ok(respond(
        POLICY,
        StatusCode::OK,
        "Passenger picked up successfully",
        payload_data(&envelope),
        DeliveryOutcome {
            notified,
            persisted: Some(persisted),
        },
    ))
}

/// `POST /api/rides/{rideId}/complete`
pub(super) async fn complete(
    State(state): State<Arc<AppState>>,
    Path(ride_id): Path<String>,
    path: MatchedPath,
    JsonObject(body): JsonObject,
) -> Result<Response, ApiError> {
    let endpoint = path.as_str();

    let mut fields = Fields::new(&body);
    let driver_id = fields.required_any("driverId");
    // Checked, but not part of the completion event.
    fields.optional_number("lat");
    fields.optional_number("lng");

    let Some(driver_id) = driver_id else {
        return validated(endpoint, Err(fields.into_errors()));
    };
    validated(endpoint, fields.finish())?;

    let completion = Completion {
        ride_id,
        driver_id,
        completed_at: iso_millis(Utc::now()),
    };
    let envelope = envelope::<RideCompleted>(&state.registry, endpoint, &completion)?;

    let trace = Trace::ride(&completion.ride_id).driver(Some(&completion.driver_id));
    let persisted = persist("complete", trace, state.relay.complete_ride(&completion.ride_id)).await;
    let notified = notify(&state, &envelope, trace).await.is_ok();

    Ok(respond(
        POLICY,
        StatusCode::OK,
        "Ride completed successfully",
        payload_data(&envelope),
        DeliveryOutcome {
            notified,
            persisted: Some(persisted),
        },
    ))
}

/// `POST /api/rides/{rideId}/position`
///
/// Positions are only broadcast, never persisted.
pub(super) async fn position(
    State(state): State<Arc<AppState>>,
    Path(ride_id): Path<String>,
    path: MatchedPath,
    JsonObject(body): JsonObject,
) -> Result<Response, ApiError> {
    let endpoint = path.as_str();

    let mut fields = Fields::new(&body);
    let lat = fields.required_number("lat");
    let lng = fields.required_number("lng");
    let bearing = fields.optional_number("bearing");
    let speed = fields.optional_number("speed");
    let driver_id = fields.optional_any("driverId");

    let (Some(lat), Some(lng)) = (lat, lng) else {
        return validated(endpoint, Err(fields.into_errors()));
    };
    validated(endpoint, fields.finish())?;

    let position = Position {
        ride_id,
        lat,
        lng,
        bearing,
        speed,
        driver_id,
        timestamp: iso_offset(Utc::now()),
    };
    let envelope = envelope::<RidePositionUpdated>(&state.registry, endpoint, &position)?;

    let trace = Trace::ride(&position.ride_id).driver(position.driver_id.as_ref());
    let notified = notify(&state, &envelope, trace).await.is_ok();

    Ok(respond(
        POLICY,
        StatusCode::OK,
        "Position updated successfully",
        json!({
            "rideId": position.ride_id,
            "lat": position.lat,
            "lng": position.lng,
        }),
        DeliveryOutcome {
            notified,
            persisted: None,
        },
    ))
}
