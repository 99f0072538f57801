//! In-process message router.
//!
//! The router owns the live channels of the local broker and fans published
//! messages out to every subscribed connection.

use crate::channel::{Channel, ChannelName};
use crate::message::Message;
use dashmap::{DashMap, DashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

/// Router errors.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Not subscribed to channel.
    #[error("Not subscribed to channel: {0}")]
    NotSubscribed(String),

    /// Already subscribed to channel.
    #[error("Already subscribed to channel: {0}")]
    AlreadySubscribed(String),

    /// Maximum subscriptions reached.
    #[error("Maximum subscriptions reached")]
    MaxSubscriptionsReached,

    /// Maximum number of live channels reached.
    #[error("Maximum channels reached")]
    MaxChannelsReached,
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum number of live channels.
    pub max_channels: usize,
    /// Maximum subscriptions per connection.
    pub max_subscriptions_per_connection: usize,
    /// Channel broadcast capacity.
    pub channel_capacity: usize,
    /// Whether to drop channels once their last subscriber leaves.
    pub auto_delete_empty_channels: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            max_channels: 10_000,
            max_subscriptions_per_connection: 100,
            channel_capacity: 1024,
            auto_delete_empty_channels: true,
        }
    }
}

/// The central message router.
pub struct Router {
    /// Channels indexed by name.
    channels: DashMap<String, Channel>,
    /// Connection subscriptions (connection_id -> set of channel names).
    subscriptions: DashMap<String, DashSet<String>>,
    config: RouterConfig,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            channels: DashMap::new(),
            subscriptions: DashMap::new(),
            config,
        }
    }

    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            channel_count: self.channels.len(),
            connection_count: self.subscriptions.len(),
            total_subscriptions: self.subscriptions.iter().map(|s| s.len()).sum(),
        }
    }

    /// Subscribe a connection to a channel, creating the channel on demand.
    ///
    /// Authorization is the caller's job; the router only enforces limits.
    ///
    /// # Errors
    ///
    /// Returns an error if already subscribed or a limit is exceeded.
    pub fn subscribe(
        &self,
        connection_id: &str,
        channel: &ChannelName,
    ) -> Result<broadcast::Receiver<Arc<Message>>, RouterError> {
        let channel_name = channel.as_str();
        let conn_subs = self
            .subscriptions
            .entry(connection_id.to_string())
            .or_default();

        if conn_subs.contains(channel_name) {
            return Err(RouterError::AlreadySubscribed(channel_name.to_string()));
        }
        if conn_subs.len() >= self.config.max_subscriptions_per_connection {
            return Err(RouterError::MaxSubscriptionsReached);
        }
        if !self.channels.contains_key(channel_name) && self.channels.len() >= self.config.max_channels {
            return Err(RouterError::MaxChannelsReached);
        }

        let mut entry = self
            .channels
            .entry(channel_name.to_string())
            .or_insert_with(|| {
                debug!(channel = %channel_name, "Creating new channel");
                Channel::with_capacity(channel.clone(), self.config.channel_capacity)
            });

        let receiver = entry.subscribe(connection_id);
        conn_subs.insert(channel_name.to_string());

        debug!(
            channel = %channel_name,
            connection = %connection_id,
            subscribers = entry.subscriber_count(),
            "Subscribed"
        );

        Ok(receiver)
    }

    /// Unsubscribe a connection from a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if not subscribed.
    pub fn unsubscribe(&self, connection_id: &str, channel_name: &str) -> Result<(), RouterError> {
        let removed = self
            .subscriptions
            .get(connection_id)
            .and_then(|subs| subs.remove(channel_name))
            .is_some();
        if !removed {
            return Err(RouterError::NotSubscribed(channel_name.to_string()));
        }

        self.leave_channel(connection_id, channel_name);
        Ok(())
    }

    /// Unsubscribe a connection from all channels.
    pub fn unsubscribe_all(&self, connection_id: &str) {
        if let Some((_, channels)) = self.subscriptions.remove(connection_id) {
            for channel_name in channels.iter() {
                self.leave_channel(connection_id, channel_name.as_str());
            }
        }
        debug!(connection = %connection_id, "Unsubscribed from all channels");
    }

    fn leave_channel(&self, connection_id: &str, channel_name: &str) {
        let Some(mut entry) = self.channels.get_mut(channel_name) else {
            return;
        };
        entry.unsubscribe(connection_id);
        debug!(
            channel = %channel_name,
            connection = %connection_id,
            subscribers = entry.subscriber_count(),
            "Unsubscribed"
        );

        if self.config.auto_delete_empty_channels && entry.is_empty() {
            drop(entry);
            self.channels.remove_if(channel_name, |_, channel| channel.is_empty());
            debug!(channel = %channel_name, "Deleted empty channel");
        }
    }

    /// Publish a message to its channel.
    ///
    /// Returns the number of subscribers that received it. A channel nobody
    /// has joined yet simply has zero recipients.
    pub fn publish(&self, message: Message) -> usize {
        let channel_name = message.channel.clone();
        match self.channels.get(&channel_name) {
            Some(channel) => {
                let count = channel.publish(message);
                trace!(channel = %channel_name, recipients = count, "Published message");
                count
            }
            None => {
                trace!(channel = %channel_name, "Publish to channel without subscribers");
                0
            }
        }
    }

    #[must_use]
    pub fn channel_exists(&self, channel_name: &str) -> bool {
        self.channels.contains_key(channel_name)
    }

    #[must_use]
    pub fn subscriber_count(&self, channel_name: &str) -> usize {
        self.channels
            .get(channel_name)
            .map(|c| c.subscriber_count())
            .unwrap_or(0)
    }

    /// Channels a connection is subscribed to.
    #[must_use]
    pub fn connection_channels(&self, connection_id: &str) -> Vec<String> {
        self.subscriptions
            .get(connection_id)
            .map(|s| s.iter().map(|c| c.clone()).collect())
            .unwrap_or_default()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// Router statistics.
#[derive(Debug, Clone)]
pub struct RouterStats {
    /// Number of live channels.
    pub channel_count: usize,
    /// Number of connections with at least one subscription record.
    pub connection_count: usize,
    /// Total number of subscriptions.
    pub total_subscriptions: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;

    fn name(channel: &str) -> ChannelName {
        ChannelName::parse(channel).unwrap()
    }

    fn message(channel: &str) -> Message {
        Message::new(channel, "PositionUpdated", Payload::new())
    }

    #[test]
    fn test_router_subscribe_unsubscribe() {
        let router = Router::new();

        let rx = router.subscribe("conn-1", &name("ride.r1")).unwrap();
        assert!(router.channel_exists("ride.r1"));
        assert_eq!(router.subscriber_count("ride.r1"), 1);
        drop(rx);

        router.unsubscribe("conn-1", "ride.r1").unwrap();
        assert!(!router.channel_exists("ride.r1"));
        assert!(matches!(
            router.unsubscribe("conn-1", "ride.r1"),
            Err(RouterError::NotSubscribed(_))
        ));
    }

    #[test]
    fn test_router_publish() {
        let router = Router::new();

        let mut rx1 = router.subscribe("conn-1", &name("ride.r1")).unwrap();
        let mut rx2 = router.subscribe("conn-2", &name("ride.r1")).unwrap();

        assert_eq!(router.publish(message("ride.r1")), 2);
        assert_eq!(rx1.try_recv().unwrap().event, "PositionUpdated");
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let router = Router::new();
        assert_eq!(router.publish(message("drivers")), 0);
    }

    #[test]
    fn test_router_already_subscribed() {
        let router = Router::new();
        let _rx = router.subscribe("conn-1", &name("drivers")).unwrap();
        assert!(matches!(
            router.subscribe("conn-1", &name("drivers")),
            Err(RouterError::AlreadySubscribed(_))
        ));
    }

    #[test]
    fn test_router_limits() {
        let router = Router::with_config(RouterConfig {
            max_channels: 2,
            max_subscriptions_per_connection: 2,
            ..RouterConfig::default()
        });

        let _a = router.subscribe("conn-1", &name("ride.a")).unwrap();
        let _b = router.subscribe("conn-1", &name("ride.b")).unwrap();
        assert!(matches!(
            router.subscribe("conn-1", &name("ride.c")),
            Err(RouterError::MaxSubscriptionsReached)
        ));
        assert!(matches!(
            router.subscribe("conn-2", &name("ride.c")),
            Err(RouterError::MaxChannelsReached)
        ));
        // Joining an existing channel is still fine.
        assert!(router.subscribe("conn-2", &name("ride.a")).is_ok());
    }

    #[test]
    fn test_router_unsubscribe_all() {
        let router = Router::new();

        let _rx1 = router.subscribe("conn-1", &name("chat")).unwrap();
        let _rx2 = router.subscribe("conn-1", &name("drivers")).unwrap();
        let _rx3 = router.subscribe("conn-2", &name("chat")).unwrap();

        let stats = router.stats();
        assert_eq!(stats.channel_count, 2);
        assert_eq!(stats.total_subscriptions, 3);

        router.unsubscribe_all("conn-1");

        assert!(router.channel_exists("chat"));
        assert!(!router.channel_exists("drivers"));
        assert!(router.connection_channels("conn-1").is_empty());
    }
}
