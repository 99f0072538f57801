//! Test doubles for code that publishes through a [`Broker`].

use crate::broker::{Ack, Broker, BrokerError, Publication};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A broker that records publications and can be told to fail or hang.
#[derive(Default)]
pub struct RecordingBroker {
    published: Mutex<Vec<Publication>>,
    failing: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    hang: AtomicBool,
    attempts: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse publications to one channel.
    pub fn fail_channel(&self, channel: &str) {
        lock(&self.failing).insert(channel.to_string());
    }

    /// Refuse every publication.
    pub fn fail_all(&self) {
        self.fail_all.store(true, Ordering::SeqCst);
    }

    /// Never answer.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    /// Accepted publications, in order.
    #[must_use]
    pub fn published(&self) -> Vec<Publication> {
        lock(&self.published).clone()
    }

    /// Accepted publications for one event name.
    #[must_use]
    pub fn published_events(&self, event: &str) -> Vec<Publication> {
        self.published().into_iter().filter(|p| p.event == event).collect()
    }

    /// Publish calls made, including failed ones.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn publish(&self, publication: &Publication) -> Result<Ack, BrokerError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_all.load(Ordering::SeqCst) || lock(&self.failing).contains(publication.channel.as_str()) {
            return Err(BrokerError::Unavailable("recording broker told to fail".into()));
        }

        lock(&self.published).push(publication.clone());
        Ok(Ack { recipients: Some(0) })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
