//! Shared server state.

use crate::config::{BrokerMode, Config};
use crate::relay::{DisabledSystemOfRecord, HttpSystemOfRecord, SystemOfRecord};
use anyhow::{Context, Result};
use ridecast_core::{Broker, ChannelRegistry, Dispatcher, HttpBroker, LocalBroker, Router, RouterConfig};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a request handler needs, assembled once at startup.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Declared channels and their authorization rules.
    pub registry: Arc<ChannelRegistry>,
    /// Publishes envelopes through the configured broker.
    pub dispatcher: Dispatcher,
    /// The ride-booking backend.
    pub relay: Arc<dyn SystemOfRecord>,
    /// The in-process broker, when this server fans out to subscribers itself.
    pub local: Option<Arc<LocalBroker>>,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: Config,
        registry: Arc<ChannelRegistry>,
        dispatcher: Dispatcher,
        relay: Arc<dyn SystemOfRecord>,
        local: Option<Arc<LocalBroker>>,
    ) -> Self {
        Self {
            config,
            registry,
            dispatcher,
            relay,
            local,
        }
    }

    /// Wire up the broker, relay and registry described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel registry is misdeclared, the `http`
    /// broker has no URL, or a client cannot be built.
    pub fn from_config(config: Config) -> Result<Self> {
        let registry = Arc::new(ChannelRegistry::ride_hailing().context("Invalid channel registry")?);

        let (broker, local): (Arc<dyn Broker>, Option<Arc<LocalBroker>>) = match config.broker.mode {
            BrokerMode::Local => {
                let router = Arc::new(Router::with_config(RouterConfig {
                    max_channels: config.limits.max_channels,
                    max_subscriptions_per_connection: config.limits.max_subscriptions_per_connection,
                    channel_capacity: config.broker.channel_capacity,
                    auto_delete_empty_channels: true,
                }));
                let local = Arc::new(LocalBroker::new(router));
                let broker: Arc<dyn Broker> = local.clone();
                (broker, Some(local))
            }
            BrokerMode::Http => {
                let url = config
                    .broker
                    .url
                    .clone()
                    .context("broker.url is required when broker.mode = \"http\"")?;
                info!(url = %url, "Publishing through external broker");
                let broker: Arc<dyn Broker> = Arc::new(
                    HttpBroker::new(url, config.broker.token.clone(), config.broker.timeout())
                        .context("Failed to create broker client")?,
                );
                (broker, None)
            }
        };
        let dispatcher = Dispatcher::with_timeout(broker, config.broker.timeout());

        let relay: Arc<dyn SystemOfRecord> = match &config.backend.url {
            Some(url) => {
                info!(url = %url, "Relaying bookings to system of record");
                Arc::new(
                    HttpSystemOfRecord::new(url, config.backend.timeout())
                        .context("Failed to create system-of-record client")?,
                )
            }
            None => {
                warn!("No backend URL configured, bookings will not be persisted");
                Arc::new(DisabledSystemOfRecord)
            }
        };

        Ok(Self::new(config, registry, dispatcher, relay, local))
    }

    /// The router subscribers attach to, in local broker mode.
    #[must_use]
    pub fn router(&self) -> Option<&Arc<Router>> {
        self.local.as_ref().map(|local| local.router())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_mode_exposes_router() {
        let mut config = Config::default();
        config.backend.url = None;
        let state = AppState::from_config(config).unwrap();
        assert!(state.router().is_some());
        assert_eq!(state.dispatcher.broker_name(), "local");
    }

    #[test]
    fn test_http_mode_requires_url() {
        let mut config = Config::default();
        config.broker.mode = BrokerMode::Http;
        assert!(AppState::from_config(config.clone()).is_err());

        config.broker.url = Some("http://broker.internal/events".into());
        let state = AppState::from_config(config).unwrap();
        assert!(state.router().is_none());
        assert_eq!(state.dispatcher.broker_name(), "http");
    }
}
