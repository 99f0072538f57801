//! Best-effort relay to the ride-booking system of record.
//!
//! The relay keeps the bookings backend in step with what riders and drivers
//! see live. Its failures are reported to the caller of these functions and
//! never reach the HTTP client: the endpoint logs them and carries on with
//! the broadcast.

use async_trait::async_trait;
use reqwest::{Client, Url};
use ridecast_core::events::{Numeric, VehicleType};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Relay errors.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No backend URL is configured.
    #[error("System of record is not configured")]
    NotConfigured,

    /// The configured backend URL cannot carry request paths.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// The request never got an answer.
    #[error("Backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Backend returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// A new booking, in the backend's snake_case schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewBooking {
    pub ride_id: String,
    pub passenger_id: i64,
    pub passenger_name: String,
    pub passenger_phone: Option<String>,
    pub vehicle_type: VehicleType,
    pub pickup_location: String,
    pub pickup_lat: Option<String>,
    pub pickup_lng: Option<String>,
    pub destination_location: String,
    pub destination_lat: Option<String>,
    pub destination_lng: Option<String>,
    pub distance: Numeric,
    pub duration: Numeric,
    pub price: Numeric,
    pub price_breakdown: Option<Value>,
}

/// Coordinates travel to the backend as strings.
#[must_use]
pub fn coordinate(value: Option<&Numeric>) -> Option<String> {
    value.map(Numeric::to_text)
}

/// Driver details recorded when a ride is accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingAcceptance {
    pub driver_id: Value,
    pub driver_name: String,
    pub driver_phone: Option<String>,
}

/// The ride-booking backend.
#[async_trait]
pub trait SystemOfRecord: Send + Sync {
    async fn create_ride(&self, booking: &NewBooking) -> Result<(), RelayError>;

    async fn accept_ride(&self, ride_id: &str, acceptance: &BookingAcceptance) -> Result<(), RelayError>;

    async fn pickup_ride(&self, ride_id: &str) -> Result<(), RelayError>;

    async fn complete_ride(&self, ride_id: &str) -> Result<(), RelayError>;
}

/// Talks to the backend's `/api/ride-bookings` endpoints.
pub struct HttpSystemOfRecord {
    client: Client,
    base: Url,
}

impl HttpSystemOfRecord {
    /// Create a relay for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not a valid base URL or the HTTP client
    /// cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let base = Url::parse(base_url).map_err(|e| RelayError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(RelayError::InvalidUrl(base_url.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base })
    }

    /// `{base}/api/ride-bookings/{segments...}`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, RelayError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| RelayError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "ride-bookings"])
            .extend(segments);
        Ok(url)
    }

    async fn post<B>(&self, url: Url, body: Option<&B>) -> Result<(), RelayError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let mut request = self.client.post(url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        debug!(url = %url, status = status.as_u16(), response = %text, "Backend responded");

        if status.is_success() {
            Ok(())
        } else {
            Err(RelayError::Status {
                status: status.as_u16(),
                body: text,
            })
        }
    }
}

#[async_trait]
impl SystemOfRecord for HttpSystemOfRecord {
    async fn create_ride(&self, booking: &NewBooking) -> Result<(), RelayError> {
        self.post(self.url(&[])?, Some(booking)).await
    }

    async fn accept_ride(&self, ride_id: &str, acceptance: &BookingAcceptance) -> Result<(), RelayError> {
        self.post(self.url(&[ride_id, "accept"])?, Some(acceptance)).await
    }

    async fn pickup_ride(&self, ride_id: &str) -> Result<(), RelayError> {
        self.post::<Value>(self.url(&[ride_id, "pickup"])?, None).await
    }

    async fn complete_ride(&self, ride_id: &str) -> Result<(), RelayError> {
        self.post::<Value>(self.url(&[ride_id, "complete"])?, None).await
    }
}

/// Used when no backend is configured. Every call fails with
/// [`RelayError::NotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSystemOfRecord;

#[async_trait]
impl SystemOfRecord for DisabledSystemOfRecord {
    async fn create_ride(&self, _: &NewBooking) -> Result<(), RelayError> {
        Err(RelayError::NotConfigured)
    }

    async fn accept_ride(&self, _: &str, _: &BookingAcceptance) -> Result<(), RelayError> {
        Err(RelayError::NotConfigured)
    }

    async fn pickup_ride(&self, _: &str) -> Result<(), RelayError> {
        Err(RelayError::NotConfigured)
    }

    async fn complete_ride(&self, _: &str) -> Result<(), RelayError> {
        Err(RelayError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn booking() -> NewBooking {
        NewBooking {
            ride_id: "ride-1".into(),
            passenger_id: 42,
            passenger_name: "Ana".into(),
            passenger_phone: None,
            vehicle_type: VehicleType::Suv,
            pickup_location: "Airport".into(),
            pickup_lat: coordinate(Numeric::from_f64(1.5).as_ref()),
            pickup_lng: None,
            destination_location: "Downtown".into(),
            destination_lat: None,
            destination_lng: None,
            distance: Numeric::from(12),
            duration: Numeric::from(30),
            price: Numeric::parse(&json!("25.50")).unwrap(),
            price_breakdown: None,
        }
    }

    fn relay(server: &MockServer) -> HttpSystemOfRecord {
        HttpSystemOfRecord::new(&server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_create_ride_posts_snake_case_booking() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ride-bookings"))
            .and(body_json(json!({
                "ride_id": "ride-1",
                "passenger_id": 42,
                "passenger_name": "Ana",
                "passenger_phone": null,
                "vehicle_type": "suv",
                "pickup_location": "Airport",
                "pickup_lat": "1.5",
                "pickup_lng": null,
                "destination_location": "Downtown",
                "destination_lat": null,
                "destination_lng": null,
                "distance": 12,
                "duration": 30,
                "price": "25.50",
                "price_breakdown": null
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        relay(&server).create_ride(&booking()).await.unwrap();
    }

    #[tokio::test]
    async fn test_accept_ride_posts_driver() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ride-bookings/ride-1/accept"))
            .and(body_json(json!({"driver_id": 9, "driver_name": "Bo", "driver_phone": "555"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let acceptance = BookingAcceptance {
            driver_id: json!(9),
            driver_name: "Bo".into(),
            driver_phone: Some("555".into()),
        };
        relay(&server).accept_ride("ride-1", &acceptance).await.unwrap();
    }

    #[tokio::test]
    async fn test_pickup_and_complete_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/ride-bookings/ride-1/pickup"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/ride-bookings/ride-1/complete"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let relay = relay(&server);
        relay.pickup_ride("ride-1").await.unwrap();
        relay.complete_ride("ride-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
            .mount(&server)
            .await;

        match relay(&server).pickup_ride("ride-1").await {
            Err(RelayError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "down for maintenance");
            }
            other => panic!("Expected Status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_a_transport_error() {
        // Nothing listens on port 9 locally.
        let relay = HttpSystemOfRecord::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(matches!(
            relay.complete_ride("ride-1").await,
            Err(RelayError::Transport(_))
        ));
    }

    #[test]
    fn test_base_url_with_path_prefix() {
        let relay = HttpSystemOfRecord::new("http://backend.local/dms/", Duration::from_secs(1)).unwrap();
        let url = relay.url(&["ride 1", "accept"]).unwrap();
        assert_eq!(url.as_str(), "http://backend.local/dms/api/ride-bookings/ride%201/accept");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            HttpSystemOfRecord::new("mailto:ops@example.com", Duration::from_secs(1)),
            Err(RelayError::InvalidUrl(_))
        ));
        assert!(HttpSystemOfRecord::new("not a url", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn test_disabled_relay() {
        assert!(matches!(
            DisabledSystemOfRecord.pickup_ride("ride-1").await,
            Err(RelayError::NotConfigured)
        ));
    }
}
