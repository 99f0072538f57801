//! HTTP error responses.

use crate::validation::{display_name, FieldErrors};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ridecast_core::{ChannelError, ChannelPattern, ValidationError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors an endpoint can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad or missing input. Nothing was relayed or dispatched.
    #[error("Validation failed")]
    Validation(FieldErrors),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<FieldErrors> for ApiError {
    fn from(errors: FieldErrors) -> Self {
        ApiError::Validation(errors)
    }
}

impl From<ValidationError> for ApiError {
    /// A channel that cannot be built from request input is the caller's
    /// fault and is reported against the field that fed the placeholder.
    /// Anything else means an event kind is broken.
    fn from(err: ValidationError) -> Self {
        match &err {
            ValidationError::Channel { template, source, .. } => {
                let (field, reason) = match source {
                    ChannelError::MissingParam { name, .. } => (name.clone(), "is required"),
                    ChannelError::InvalidParam { name, reason } => (name.clone(), *reason),
                    ChannelError::InvalidName(reason) => (first_placeholder(template), *reason),
                    ChannelError::UnknownPattern(_) => return ApiError::Internal(err.to_string()),
                };
                ApiError::Validation(FieldErrors::single(
                    &field,
                    format!("The {} field is invalid: {}.", display_name(&field), reason),
                ))
            }
            ValidationError::Serialize { .. }
            | ValidationError::NotAnObject { .. }
            | ValidationError::NoChannels { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

fn first_placeholder(template: &str) -> String {
    ChannelPattern::parse(template)
        .ok()
        .and_then(|pattern| pattern.placeholders().next().map(str::to_string))
        .unwrap_or_else(|| "channel".to_string())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "success": false, "errors": errors })),
            )
                .into_response(),
            ApiError::Internal(message) => {
                error!(error = %message, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "message": message })),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unusable_ride_id_is_a_field_error() {
        let err = ApiError::from(ValidationError::Channel {
            event: "DriverAccepted",
            template: "ride.{rideId}",
            source: ChannelError::InvalidParam {
                name: "rideId".into(),
                reason: "value contains '.'",
            },
        });
        match err {
            ApiError::Validation(errors) => {
                assert_eq!(
                    errors.get("rideId").unwrap(),
                    ["The ride id field is invalid: value contains '.'."]
                );
            }
            other => panic!("Expected Validation, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_rendered_name_blames_the_placeholder() {
        let err = ApiError::from(ValidationError::Channel {
            event: "PositionUpdated",
            template: "ride.{rideId}",
            source: ChannelError::InvalidName("Channel name contains invalid characters"),
        });
        assert!(matches!(err, ApiError::Validation(ref e) if e.get("rideId").is_some()));
    }

    #[test]
    fn test_broken_event_kind_is_internal() {
        let err = ApiError::from(ValidationError::NoChannels { event: "RideRequest" });
        assert!(matches!(err, ApiError::Internal(_)));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_validation_status() {
        let response = ApiError::from(FieldErrors::single("lat", "The lat field is required.")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
