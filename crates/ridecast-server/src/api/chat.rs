//! `POST /api/chat/messages`, the public chat room.

use super::{envelope, notify, payload_data, respond, validated, DeliveryOutcome, DeliveryPolicy, JsonObject, Trace};
use crate::error::ApiError;
use crate::state::AppState;
use crate::validation::Fields;
use axum::extract::{MatchedPath, State};
use axum::http::StatusCode;
use axum::response::Response;
use ridecast_core::events::{ChatMessage, MessageSent};
use std::sync::Arc;

const MAX_USERNAME_CHARS: usize = 50;
const MAX_MESSAGE_CHARS: usize = 500;

pub(super) async fn send(
    State(state): State<Arc<AppState>>,
    path: MatchedPath,
    JsonObject(body): JsonObject,
) -> Result<Response, ApiError> {
    let endpoint = path.as_str();

    let mut fields = Fields::new(&body);
    let username = fields.required_text("username", MAX_USERNAME_CHARS);
    let message = fields.required_text("message", MAX_MESSAGE_CHARS);

    let (Some(username), Some(message)) = (username, message) else {
        return validated(endpoint, Err(fields.into_errors()));
    };
    validated(endpoint, fields.finish())?;

    let envelope = envelope::<MessageSent>(&state.registry, endpoint, &ChatMessage { username, message })?;
    let notified = notify(&state, &envelope, Trace::default()).await.is_ok();

    Ok(respond(
        DeliveryPolicy::BestEffort,
        StatusCode::OK,
        "Message sent",
        payload_data(&envelope),
        DeliveryOutcome {
            notified,
            persisted: None,
        },
    ))
}
