//! External broker reached over HTTP.
//!
//! Each publication becomes one `POST` with a JSON body of the form
//! `{"name": event, "channels": [channel], "data": payload}`.

use super::{Ack, Broker, BrokerError, Publication};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct PublishBody<'a> {
    name: &'a str,
    channels: [&'a str; 1],
    data: &'a crate::envelope::Payload,
}

/// HTTP publish client for an external broker.
pub struct HttpBroker {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpBroker {
    /// Create a broker client posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self, BrokerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Unavailable(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl Broker for HttpBroker {
    async fn publish(&self, publication: &Publication) -> Result<Ack, BrokerError> {
        let body = PublishBody {
            name: &publication.event,
            channels: [publication.channel.as_str()],
            data: &publication.payload,
        };

        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| BrokerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(channel = %publication.channel, event = %publication.event, "Broker accepted publication");
        Ok(Ack { recipients: None })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelName;
    use crate::envelope::Payload;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn publication() -> Publication {
        let mut payload = Payload::new();
        payload.insert("counter".into(), json!(777));
        Publication::new(ChannelName::parse("test-counter").unwrap(), "CounterUpdated", Arc::new(payload))
    }

    #[tokio::test]
    async fn test_posts_publication() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({
                "name": "CounterUpdated",
                "channels": ["test-counter"],
                "data": {"counter": 777}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let broker = HttpBroker::new(
            format!("{}/events", server.uri()),
            Some("secret".into()),
            Duration::from_secs(2),
        )
        .unwrap();

        let ack = broker.publish(&publication()).await.unwrap();
        assert_eq!(ack.recipients, None);
    }

    #[tokio::test]
    async fn test_error_status_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let broker = HttpBroker::new(server.uri(), None, Duration::from_secs(2)).unwrap();
        match broker.publish(&publication()).await {
            Err(BrokerError::Rejected { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unreachable_broker_is_unavailable() {
        let broker = HttpBroker::new("http://127.0.0.1:9/events", None, Duration::from_millis(500)).unwrap();
        assert!(matches!(
            broker.publish(&publication()).await,
            Err(BrokerError::Unavailable(_))
        ));
    }
}
