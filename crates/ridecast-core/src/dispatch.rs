//! Envelope dispatch.
//!
//! The dispatcher publishes an envelope to each of its target channels once.
//! There is no retry, and channels are independent: a failure on one channel
//! does not stop the others from being attempted.

use crate::broker::{Ack, Broker, BrokerError, Publication};
use crate::channel::ChannelName;
use crate::envelope::Envelope;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

/// Default time to wait for a broker acknowledgment.
pub const DEFAULT_BROKER_TIMEOUT: Duration = Duration::from_secs(3);

/// Dispatch errors.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The broker refused or could not take the publication.
    #[error("Broker unavailable for {event} on {channel}: {source}")]
    BrokerUnavailable {
        event: &'static str,
        channel: ChannelName,
        #[source]
        source: BrokerError,
    },

    /// The broker did not answer in time.
    #[error("Broker did not acknowledge {event} on {channel} within {timeout:?}")]
    Timeout {
        event: &'static str,
        channel: ChannelName,
        timeout: Duration,
    },
}

impl DispatchError {
    #[must_use]
    pub fn channel(&self) -> &ChannelName {
        match self {
            DispatchError::BrokerUnavailable { channel, .. } | DispatchError::Timeout { channel, .. } => channel,
        }
    }
}

/// Broker acknowledgment for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub channel: ChannelName,
    pub ack: Ack,
}

/// Outcome of a fully successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub event: &'static str,
    pub receipts: Vec<Receipt>,
}

impl DispatchReport {
    /// Sum of known local recipients across channels.
    #[must_use]
    pub fn recipients(&self) -> usize {
        self.receipts.iter().filter_map(|r| r.ack.recipients).sum()
    }
}

/// Publishes envelopes through a broker.
#[derive(Clone)]
pub struct Dispatcher {
    broker: Arc<dyn Broker>,
    timeout: Duration,
}

impl Dispatcher {
    #[must_use]
    pub fn new(broker: Arc<dyn Broker>) -> Self {
        Self::with_timeout(broker, DEFAULT_BROKER_TIMEOUT)
    }

    #[must_use]
    pub fn with_timeout(broker: Arc<dyn Broker>, timeout: Duration) -> Self {
        Self { broker, timeout }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn broker_name(&self) -> &'static str {
        self.broker.name()
    }

    /// Publish `envelope` to every target channel.
    ///
    /// # Errors
    ///
    /// Every channel is attempted. If any failed, the first failure is
    /// returned; every failure is logged.
    pub async fn dispatch(&self, envelope: &Envelope) -> Result<DispatchReport, DispatchError> {
        let event = envelope.event();
        let mut receipts = Vec::with_capacity(envelope.channels().len());
        let mut first_failure = None;

        for channel in envelope.channels() {
            let publication = Publication::new(channel.clone(), event, envelope.shared_payload());
            match self.publish_one(event, &publication).await {
                Ok(ack) => {
                    debug!(
                        event,
                        channel = %channel,
                        broker = self.broker.name(),
                        recipients = ?ack.recipients,
                        "Dispatched"
                    );
                    receipts.push(Receipt {
                        channel: channel.clone(),
                        ack,
                    });
                }
                Err(e) => {
                    error!(event, channel = %channel, broker = self.broker.name(), error = %e, "Dispatch failed");
                    first_failure.get_or_insert(e);
                }
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(DispatchReport { event, receipts }),
        }
    }

    async fn publish_one(&self, event: &'static str, publication: &Publication) -> Result<Ack, DispatchError> {
        match tokio::time::timeout(self.timeout, self.broker.publish(publication)).await {
            Ok(Ok(ack)) => Ok(ack),
            Ok(Err(source)) => Err(DispatchError::BrokerUnavailable {
                event,
                channel: publication.channel.clone(),
                source,
            }),
            Err(_) => Err(DispatchError::Timeout {
                event,
                channel: publication.channel.clone(),
                timeout: self.timeout,
            }),
        }
    }
}
