//! `POST /api/test/counter`, an end-to-end check of the realtime path.
//!
//! Unlike the ride endpoints, a failed broadcast here is a 500.

use super::{envelope, notify, validated, DeliveryOutcome, DeliveryPolicy, JsonObject, Trace};
use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::Fields;
use axum::extract::{MatchedPath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ridecast_core::events::{Counter, CounterUpdated};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

const POLICY: DeliveryPolicy = DeliveryPolicy::RequireNotify;

pub(super) async fn increment(
    State(state): State<Arc<AppState>>,
    path: MatchedPath,
    JsonObject(body): JsonObject,
) -> Result<Response, ApiError> {
    let endpoint = path.as_str();

    let mut fields = Fields::new(&body);
    let counter = fields.optional_integer("counter").unwrap_or(0);
    validated(endpoint, fields.finish())?;

    info!(counter, "Counter API called");
    let envelope = envelope::<CounterUpdated>(&state.registry, endpoint, &Counter { counter })?;
    let result = notify(&state, &envelope, Trace::default()).await;

    let outcome = DeliveryOutcome {
        notified: result.is_ok(),
        persisted: None,
    };
    let response = match result {
        Err(e) if !POLICY.is_satisfied(outcome) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "success": false,
                "message": format!("Broadcast failed: {e}"),
                "counter": counter,
                "delivery": outcome,
            })),
        )
            .into_response(),
        _ => Json(json!({
            "success": true,
            "message": "Counter updated and broadcast sent",
            "counter": counter,
            "delivery": outcome,
        }))
        .into_response(),
    };
    Ok(response)
}
