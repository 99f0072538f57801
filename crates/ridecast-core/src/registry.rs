//! Channel registry.
//!
//! Declares which channel patterns exist and who may subscribe to them. The
//! registry is assembled once at startup and shared read-only afterwards.

use crate::channel::{ChannelError, ChannelName, ChannelParams, ChannelPattern};
use crate::envelope::EnvelopeBuilder;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised while declaring channels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Channel pattern already registered: {0}")]
    DuplicatePattern(String),

    #[error("Invalid channel pattern {template}: {reason}")]
    InvalidPattern {
        template: String,
        reason: &'static str,
    },
}

/// Who is asking to subscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    /// An authenticated user, by id.
    User(String),
}

impl Identity {
    #[must_use]
    pub fn user(id: impl Into<String>) -> Self {
        Identity::User(id.into())
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::Anonymous => None,
            Identity::User(id) => Some(id),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Anonymous => f.write_str("anonymous"),
            Identity::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Authorization predicate for one pattern.
pub type Authorizer = Arc<dyn Fn(&Identity, &ChannelParams) -> bool + Send + Sync>;

struct Entry {
    pattern: ChannelPattern,
    authorize: Authorizer,
}

/// Registered channel patterns, checked in registration order.
#[derive(Default)]
pub struct ChannelRegistry {
    entries: Vec<Entry>,
}

impl ChannelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The channels of the ride-hailing app.
    ///
    /// `chat`, `drivers`, `ride.{rideId}` and `test-counter` are open to
    /// everyone for testing. `App.Models.User.{id}` is private to that user.
    ///
    /// # Errors
    ///
    /// Propagates [`ConfigurationError`] from [`ChannelRegistry::register`].
    pub fn ride_hailing() -> Result<Self, ConfigurationError> {
        let mut registry = Self::new();
        registry
            .register("App.Models.User.{id}", |identity, params| {
                let own = identity.user_id().and_then(|id| id.trim().parse::<i64>().ok());
                let requested = params.get("id").and_then(|id| id.trim().parse::<i64>().ok());
                matches!((own, requested), (Some(a), Some(b)) if a == b)
            })?
            .register("chat", |_, _| true)?
            .register("drivers", |_, _| true)?
            .register("ride.{rideId}", |_, _| true)?
            .register("test-counter", |_, _| true)?;
        Ok(registry)
    }

    /// Declare a channel pattern and its authorization predicate.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is malformed or already registered.
    pub fn register<F>(&mut self, template: &str, authorize: F) -> Result<&mut Self, ConfigurationError>
    where
        F: Fn(&Identity, &ChannelParams) -> bool + Send + Sync + 'static,
    {
        if self.find(template).is_some() {
            return Err(ConfigurationError::DuplicatePattern(template.to_string()));
        }
        let pattern = ChannelPattern::parse(template).map_err(|reason| ConfigurationError::InvalidPattern {
            template: template.to_string(),
            reason,
        })?;

        debug!(pattern = %template, "Registered channel pattern");
        self.entries.push(Entry {
            pattern,
            authorize: Arc::new(authorize),
        });
        Ok(self)
    }

    /// Decide whether `identity` may subscribe to `channel`.
    ///
    /// The first matching pattern decides. Unknown channels are denied.
    #[must_use]
    pub fn authorize(&self, channel: &str, identity: &Identity) -> bool {
        for entry in &self.entries {
            if let Some(params) = entry.pattern.matches(channel) {
                let allowed = (entry.authorize)(identity, &params);
                trace!(channel, pattern = %entry.pattern, %identity, allowed, "Channel authorization");
                return allowed;
            }
        }
        debug!(channel, %identity, "No channel pattern matches, denying");
        false
    }

    /// Build a concrete channel name from a registered template.
    ///
    /// # Errors
    ///
    /// Returns an error if the template is unknown or the params do not fit it.
    pub fn resolve(&self, template: &str, params: &ChannelParams) -> Result<ChannelName, ChannelError> {
        self.find(template)
            .ok_or_else(|| ChannelError::UnknownPattern(template.to_string()))?
            .render(params)
    }

    /// Registered patterns in registration order.
    pub fn patterns(&self) -> impl Iterator<Item = &ChannelPattern> {
        self.entries.iter().map(|e| &e.pattern)
    }

    /// An envelope builder that resolves channels against this registry.
    #[must_use]
    pub fn envelopes(&self) -> EnvelopeBuilder<'_> {
        EnvelopeBuilder::new(self)
    }

    fn find(&self, template: &str) -> Option<&ChannelPattern> {
        self.patterns().find(|p| p.template() == template)
    }
}

impl fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.patterns().map(ChannelPattern::template)).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_channels_allow_anyone() {
        let registry = ChannelRegistry::ride_hailing().unwrap();
        for channel in ["chat", "drivers", "ride.r1", "test-counter"] {
            assert!(registry.authorize(channel, &Identity::Anonymous), "{channel}");
            assert!(registry.authorize(channel, &Identity::user("7")), "{channel}");
        }
    }

    #[test]
    fn test_private_user_channel_requires_same_id() {
        let registry = ChannelRegistry::ride_hailing().unwrap();
        assert!(registry.authorize("App.Models.User.42", &Identity::user("42")));
        assert!(!registry.authorize("App.Models.User.42", &Identity::user("7")));
        assert!(!registry.authorize("App.Models.User.42", &Identity::Anonymous));
        assert!(!registry.authorize("App.Models.User.abc", &Identity::user("abc")));
    }

    #[test]
    fn test_unknown_channel_denied() {
        let registry = ChannelRegistry::ride_hailing().unwrap();
        assert!(!registry.authorize("admin", &Identity::user("1")));
        assert!(!registry.authorize("ride.a.b", &Identity::Anonymous));
    }

    #[test]
    fn test_first_match_wins() {
        let mut registry = ChannelRegistry::new();
        registry
            .register("ride.vip", |_, _| false)
            .unwrap()
            .register("ride.{rideId}", |_, _| true)
            .unwrap();

        assert!(!registry.authorize("ride.vip", &Identity::Anonymous));
        assert!(registry.authorize("ride.r1", &Identity::Anonymous));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ChannelRegistry::new();
        registry.register("drivers", |_, _| true).unwrap();
        assert_eq!(
            registry.register("drivers", |_, _| false).err(),
            Some(ConfigurationError::DuplicatePattern("drivers".into()))
        );
        assert_eq!(registry.patterns().count(), 1);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut registry = ChannelRegistry::new();
        assert!(matches!(
            registry.register("ride.{", |_, _| true),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_resolve_against_registered_patterns() {
        let registry = ChannelRegistry::ride_hailing().unwrap();
        let name = registry
            .resolve("ride.{rideId}", &ChannelParams::new().with("rideId", "r1"))
            .unwrap();
        assert_eq!(name.as_str(), "ride.r1");

        assert_eq!(
            registry.resolve("trip.{id}", &ChannelParams::new().with("id", "1")),
            Err(ChannelError::UnknownPattern("trip.{id}".into()))
        );
    }
}
