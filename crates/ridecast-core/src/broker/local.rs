//! In-process broker backed by the [`Router`].

use super::{Ack, Broker, BrokerError, Publication};
use crate::message::Message;
use crate::router::Router;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Publishes to WebSocket subscribers connected to this process.
pub struct LocalBroker {
    router: Arc<Router>,
    open: AtomicBool,
}

impl LocalBroker {
    #[must_use]
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            open: AtomicBool::new(true),
        }
    }

    /// The router subscribers attach to.
    #[must_use]
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Stop accepting publications.
    pub fn shutdown(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            info!("Local broker shut down");
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for LocalBroker {
    async fn publish(&self, publication: &Publication) -> Result<Ack, BrokerError> {
        if !self.is_open() {
            return Err(BrokerError::Unavailable("local broker is shut down".into()));
        }

        let message = Message::new(
            publication.channel.as_str(),
            publication.event.clone(),
            Arc::clone(&publication.payload),
        );
        let recipients = self.router.publish(message);
        Ok(Ack {
            recipients: Some(recipients),
        })
    }

    fn name(&self) -> &'static str {
        "local"
    }
}
