//! The pub/sub transport seam.
//!
//! A [`Broker`] accepts one `(channel, event, payload)` publication at a time
//! and fans it out to subscribers. It only acknowledges acceptance; whether
//! any subscriber actually received the message is never reported back.

mod local;

#[cfg(feature = "http-broker")]
mod http;

pub use local::LocalBroker;

#[cfg(feature = "http-broker")]
pub use http::HttpBroker;

use crate::channel::ChannelName;
use crate::envelope::Payload;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Broker errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker could not be reached or is shut down.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The broker answered but refused the publication.
    #[error("Broker rejected publication with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// One message for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub channel: ChannelName,
    pub event: String,
    pub payload: Arc<Payload>,
}

impl Publication {
    #[must_use]
    pub fn new(channel: ChannelName, event: impl Into<String>, payload: Arc<Payload>) -> Self {
        Self {
            channel,
            event: event.into(),
            payload,
        }
    }
}

/// Broker acknowledgment: accepted for fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ack {
    /// Local recipient count, when the broker knows it.
    pub recipients: Option<usize>,
}

/// A pub/sub broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Publish one message, returning once the broker accepted or refused it.
    async fn publish(&self, publication: &Publication) -> Result<Ack, BrokerError>;

    /// Broker name for logs (e.g. "local", "http").
    fn name(&self) -> &'static str;
}
