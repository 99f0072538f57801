//! HTTP endpoints under `/api`.
//!
//! Every endpoint runs the same pipeline: validate the body, build the
//! envelope, relay to the system of record where the endpoint has one, then
//! dispatch. Validation and channel errors stop the request with a 422
//! before anything leaves the process. Relay and dispatch outcomes are
//! captured independently in a [`DeliveryOutcome`], and each endpoint's
//! [`DeliveryPolicy`] decides whether a failed dispatch fails the response.

mod chat;
mod counter;
mod rides;

use crate::error::ApiError;
use crate::metrics;
use crate::relay::RelayError;
use crate::state::AppState;
use crate::validation::FieldErrors;
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, MatchedPath, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ridecast_core::{ChannelRegistry, DispatchError, DispatchReport, Envelope, EventKind};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Routes mounted under `/api`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/rides", post(rides::create))
        .route("/rides/:ride_id", get(rides::show))
        .route("/rides/:ride_id/accept", post(rides::accept))
        .route("/rides/:ride_id/pickup", post(rides::pickup))
        .route("/rides/:ride_id/complete", post(rides::complete))
        .route("/rides/:ride_id/position", post(rides::position))
        .route("/test/counter", post(counter::increment))
        .route("/chat/messages", post(chat::send))
}

/// The metrics label of a request: its matched route, such as
/// `/api/rides/:ride_id/accept`.
fn endpoint_of(req: &Request) -> String {
    req.extensions()
        .get::<MatchedPath>()
        .map_or_else(|| req.uri().path().to_owned(), |p| p.as_str().to_owned())
}

/// A request body that must be a JSON object. An empty body is an empty
/// object.
pub struct JsonObject(pub Map<String, Value>);

#[async_trait]
impl<S> FromRequest<S> for JsonObject
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let endpoint = endpoint_of(&req);

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| reject(&endpoint, FieldErrors::single("body", e.body_text())))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonObject(Map::new()));
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Object(map)) => Ok(JsonObject(map)),
            Ok(_) => Err(reject(
                &endpoint,
                FieldErrors::single("body", "The request body must be a JSON object."),
            )),
            Err(e) => Err(reject(
                &endpoint,
                FieldErrors::single("body", format!("The request body is not valid JSON: {e}.")),
            )),
        }
    }
}

/// Count and log a 422.
pub(crate) fn reject(endpoint: &str, errors: FieldErrors) -> ApiError {
    metrics::record_validation_failure(endpoint);
    debug!(endpoint, errors = ?errors, "Validation failed");
    ApiError::Validation(errors)
}

/// Attach the endpoint to a validation result.
pub(crate) fn validated<T>(endpoint: &str, result: Result<T, FieldErrors>) -> Result<T, ApiError> {
    result.map_err(|errors| reject(endpoint, errors))
}

/// Build an envelope from validated input.
///
/// A channel that cannot be built from the input is a 422 and is counted
/// like any other validation failure.
pub(crate) fn envelope<E: EventKind>(
    registry: &ChannelRegistry,
    endpoint: &str,
    input: &E::Input,
) -> Result<Envelope, ApiError> {
    registry
        .envelopes()
        .build::<E>(input)
        .map_err(|e| match ApiError::from(e) {
            ApiError::Validation(errors) => reject(endpoint, errors),
            internal => internal,
        })
}

/// What happened after validation passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryOutcome {
    /// Every target channel accepted the broadcast.
    pub notified: bool,
    /// The system of record took the update. `None` when the endpoint does
    /// not relay.
    pub persisted: Option<bool>,
}

/// How an endpoint treats a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Answer success once validation passed, reporting delivery alongside.
    BestEffort,
    /// Answer 500 when the broadcast did not go out.
    RequireNotify,
}

impl DeliveryPolicy {
    #[must_use]
    pub fn is_satisfied(self, outcome: DeliveryOutcome) -> bool {
        match self {
            DeliveryPolicy::BestEffort => true,
            DeliveryPolicy::RequireNotify => outcome.notified,
        }
    }
}

/// Correlation fields for relay and dispatch logs.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Trace<'a> {
    pub ride_id: Option<&'a str>,
    pub driver_id: Option<&'a Value>,
}

impl<'a> Trace<'a> {
    pub(crate) fn ride(ride_id: &'a str) -> Self {
        Self {
            ride_id: Some(ride_id),
            driver_id: None,
        }
    }

    pub(crate) fn driver(mut self, driver_id: Option<&'a Value>) -> Self {
        self.driver_id = driver_id;
        self
    }

    fn ride_id(&self) -> &str {
        self.ride_id.unwrap_or("-")
    }

    fn driver_id(&self) -> String {
        match self.driver_id {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => "-".to_string(),
        }
    }
}

/// Run a relay call, logging and counting the outcome. Never fails.
pub(crate) async fn persist<F>(operation: &'static str, trace: Trace<'_>, call: F) -> bool
where
    F: Future<Output = Result<(), RelayError>>,
{
    match call.await {
        Ok(()) => {
            info!(operation, ride_id = trace.ride_id(), driver_id = %trace.driver_id(), "Saved to system of record");
            metrics::record_relay(operation, true);
            true
        }
        Err(RelayError::NotConfigured) => {
            debug!(operation, ride_id = trace.ride_id(), "System of record not configured, skipping");
            metrics::record_relay(operation, false);
            false
        }
        Err(e) => {
            error!(
                operation,
                ride_id = trace.ride_id(),
                driver_id = %trace.driver_id(),
                error = %e,
                "Failed to save to system of record"
            );
            metrics::record_relay(operation, false);
            false
        }
    }
}

/// Dispatch an envelope, logging and counting the outcome.
pub(crate) async fn notify(
    state: &AppState,
    envelope: &Envelope,
    trace: Trace<'_>,
) -> Result<DispatchReport, DispatchError> {
    let result = state.dispatcher.dispatch(envelope).await;
    match &result {
        Ok(report) => info!(
            event = envelope.event(),
            ride_id = trace.ride_id(),
            recipients = report.recipients(),
            "Broadcast sent"
        ),
        Err(e) => error!(
            event = envelope.event(),
            ride_id = trace.ride_id(),
            driver_id = %trace.driver_id(),
            error = %e,
            "Broadcast failed"
        ),
    }
    metrics::record_dispatch(envelope.event(), result.is_ok());
    result
}

/// `{success, message, data, delivery}`, shaped by `policy`.
pub(crate) fn respond(
    policy: DeliveryPolicy,
    status: StatusCode,
    message: &str,
    data: Value,
    outcome: DeliveryOutcome,
) -> Response {
    if policy.is_satisfied(outcome) {
        (
            status,
            Json(json!({
                "success": true,
                "message": message,
                "data": data,
                "delivery": outcome,
            })),
        )
            .into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "message": "Broadcast failed",
                "data": data,
                "delivery": outcome,
            })),
        )
            .into_response()
    }
}

/// The payload an envelope carries, as a response `data` value.
pub(crate) fn payload_data(envelope: &Envelope) -> Value {
    Value::Object(envelope.payload().clone())
}
