//! Channel names and patterns.
//!
//! A channel is a named mailbox. Names may embed dynamic segments, declared
//! through patterns such as `ride.{rideId}`. A placeholder matches one or more
//! characters other than `.`.

use crate::message::Message;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Default broadcast channel capacity.
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Channel naming errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The rendered or supplied name breaks the naming rules.
    #[error("Invalid channel name: {0}")]
    InvalidName(&'static str),

    /// The template was never registered.
    #[error("Channel pattern not registered: {0}")]
    UnknownPattern(String),

    /// A placeholder had no value.
    #[error("Missing value for {{{name}}} in {template}")]
    MissingParam { template: String, name: String },

    /// A placeholder value cannot be embedded in a channel name.
    #[error("Invalid value for {{{name}}}: {reason}")]
    InvalidParam { name: String, reason: &'static str },
}

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name.starts_with('$') {
        return Err("Channel names starting with '$' are reserved");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// A validated channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    /// Parse and validate a channel name.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidName`] if the name breaks the naming rules.
    pub fn parse(name: impl Into<String>) -> Result<Self, ChannelError> {
        let name = name.into();
        validate_channel_name(&name).map_err(ChannelError::InvalidName)?;
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Values for the placeholders of a pattern, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelParams(Vec<(String, String)>);

impl ChannelParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value, replacing any earlier value for the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.0.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A channel name template, e.g. `ride.{rideId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPattern {
    template: String,
    segments: Vec<Segment>,
}

impl ChannelPattern {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns a reason if braces are unbalanced, a placeholder is empty or
    /// repeated, or the literal text is not a valid channel name.
    pub fn parse(template: &str) -> Result<Self, &'static str> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut names: HashSet<&str> = HashSet::new();
        let mut rest = template;

        while let Some(c) = rest.chars().next() {
            match c {
                '{' => {
                    let end = rest.find('}').ok_or("Unclosed placeholder")?;
                    let name = &rest[1..end];
                    if name.is_empty() {
                        return Err("Empty placeholder name");
                    }
                    if name.contains('{') {
                        return Err("Nested placeholder");
                    }
                    if !names.insert(name) {
                        return Err("Placeholder appears twice");
                    }
                    if let Some(Segment::Placeholder(_)) = segments.last() {
                        if literal.is_empty() {
                            return Err("Adjacent placeholders are ambiguous");
                        }
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(name.to_string()));
                    rest = &rest[end + 1..];
                }
                '}' => return Err("Unmatched closing brace"),
                _ => {
                    literal.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        // Placeholder values are at least one character, so check the
        // literal skeleton with a stand-in.
        let skeleton: String = segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => l.as_str(),
                Segment::Placeholder(_) => "x",
            })
            .collect();
        validate_channel_name(&skeleton)?;

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    /// The template this pattern was parsed from.
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Whether the pattern has no placeholders.
    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, Segment::Literal(_)))
    }

    /// Placeholder names in template order.
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a concrete channel name, returning the placeholder values.
    #[must_use]
    pub fn matches(&self, channel: &str) -> Option<ChannelParams> {
        let mut params = ChannelParams::new();
        if match_segments(&self.segments, channel, &mut params) {
            Some(params)
        } else {
            None
        }
    }

    /// Render a concrete channel name from placeholder values.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is missing, empty, or contains `.`, or if
    /// the result is not a valid channel name.
    pub fn render(&self, params: &ChannelParams) -> Result<ChannelName, ChannelError> {
        let mut name = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => name.push_str(literal),
                Segment::Placeholder(placeholder) => {
                    let value = params.get(placeholder).ok_or_else(|| ChannelError::MissingParam {
                        template: self.template.clone(),
                        name: placeholder.clone(),
                    })?;
                    if value.is_empty() {
                        return Err(ChannelError::InvalidParam {
                            name: placeholder.clone(),
                            reason: "value is empty",
                        });
                    }
                    if value.contains('.') {
                        return Err(ChannelError::InvalidParam {
                            name: placeholder.clone(),
                            reason: "value contains '.'",
                        });
                    }
                    name.push_str(value);
                }
            }
        }
        ChannelName::parse(name)
    }
}

impl fmt::Display for ChannelPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}

fn match_segments(segments: &[Segment], input: &str, params: &mut ChannelParams) -> bool {
    let Some((first, rest)) = segments.split_first() else {
        return input.is_empty();
    };

    match first {
        Segment::Literal(literal) => input
            .strip_prefix(literal.as_str())
            .is_some_and(|remaining| match_segments(rest, remaining, params)),
        Segment::Placeholder(name) => {
            let run = input.find('.').unwrap_or(input.len());
            // Longest value first, backing off like a greedy regex.
            for end in (1..=run).rev() {
                if !input.is_char_boundary(end) {
                    continue;
                }
                if match_segments(rest, &input[end..], params) {
                    params.insert(name.clone(), &input[..end]);
                    return true;
                }
            }
            false
        }
    }
}

/// A live channel inside the in-process broker.
#[derive(Debug)]
pub struct Channel {
    name: ChannelName,
    sender: broadcast::Sender<Arc<Message>>,
    subscribers: HashSet<String>,
    capacity: usize,
}

impl Channel {
    /// Create a new channel.
    #[must_use]
    pub fn new(name: ChannelName) -> Self {
        Self::with_capacity(name, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new channel with a specific capacity.
    #[must_use]
    pub fn with_capacity(name: ChannelName, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            name,
            sender,
            subscribers: HashSet::new(),
            capacity,
        }
    }

    #[must_use]
    pub fn name(&self) -> &ChannelName {
        &self.name
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    #[must_use]
    pub fn is_subscribed(&self, connection_id: &str) -> bool {
        self.subscribers.contains(connection_id)
    }

    /// Subscribe a connection, returning a receiver for this channel.
    pub fn subscribe(&mut self, connection_id: impl Into<String>) -> broadcast::Receiver<Arc<Message>> {
        let conn_id = connection_id.into();
        debug!(channel = %self.name, connection = %conn_id, "Connection subscribed");
        self.subscribers.insert(conn_id);
        self.sender.subscribe()
    }

    /// Unsubscribe a connection. Returns `true` if it was subscribed.
    pub fn unsubscribe(&mut self, connection_id: &str) -> bool {
        let removed = self.subscribers.remove(connection_id);
        if removed {
            debug!(channel = %self.name, connection = %connection_id, "Connection unsubscribed");
        }
        removed
    }

    /// Publish a message, returning how many receivers got it.
    pub fn publish(&self, message: Message) -> usize {
        trace!(channel = %self.name, event = %message.event, "Publishing message");
        self.sender.send(Arc::new(message)).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;

    #[test]
    fn test_channel_name_validation() {
        assert!(ChannelName::parse("ride.r1").is_ok());
        assert!(ChannelName::parse("").is_err());
        assert!(ChannelName::parse("$system").is_err());
        assert!(ChannelName::parse("a".repeat(MAX_CHANNEL_NAME_LENGTH + 1)).is_err());
        assert!(ChannelName::parse("tab\there").is_err());
    }

    #[test]
    fn test_pattern_matches_single_segment() {
        let pattern = ChannelPattern::parse("ride.{rideId}").unwrap();
        let params = pattern.matches("ride.r1").unwrap();
        assert_eq!(params.get("rideId"), Some("r1"));

        assert!(pattern.matches("ride.").is_none());
        assert!(pattern.matches("ride.a.b").is_none());
        assert!(pattern.matches("rides.r1").is_none());
        assert!(pattern.matches("drivers").is_none());
    }

    #[test]
    fn test_pattern_backtracks_on_shared_separator() {
        let pattern = ChannelPattern::parse("pair.{a}-{b}").unwrap();
        let params = pattern.matches("pair.x-y-z").unwrap();
        assert_eq!(params.get("a"), Some("x-y"));
        assert_eq!(params.get("b"), Some("z"));
    }

    #[test]
    fn test_literal_pattern() {
        let pattern = ChannelPattern::parse("drivers").unwrap();
        assert!(pattern.is_literal());
        assert!(pattern.matches("drivers").unwrap().is_empty());
        assert!(pattern.matches("drivers2").is_none());
    }

    #[test]
    fn test_pattern_parse_errors() {
        assert!(ChannelPattern::parse("ride.{rideId").is_err());
        assert!(ChannelPattern::parse("ride.{}").is_err());
        assert!(ChannelPattern::parse("ride}").is_err());
        assert!(ChannelPattern::parse("{a}.{a}").is_err());
        assert!(ChannelPattern::parse("{a}{b}").is_err());
        assert!(ChannelPattern::parse("$private.{id}").is_err());
        assert!(ChannelPattern::parse("").is_err());
    }

    #[test]
    fn test_render() {
        let pattern = ChannelPattern::parse("ride.{rideId}").unwrap();
        let name = pattern
            .render(&ChannelParams::new().with("rideId", "ride-abc"))
            .unwrap();
        assert_eq!(name.as_str(), "ride.ride-abc");

        assert!(matches!(
            pattern.render(&ChannelParams::new()),
            Err(ChannelError::MissingParam { .. })
        ));
        assert!(matches!(
            pattern.render(&ChannelParams::new().with("rideId", "a.b")),
            Err(ChannelError::InvalidParam { .. })
        ));
        assert!(matches!(
            pattern.render(&ChannelParams::new().with("rideId", "")),
            Err(ChannelError::InvalidParam { .. })
        ));
    }

    #[tokio::test]
    async fn test_channel_publish() {
        let mut channel = Channel::new(ChannelName::parse("drivers").unwrap());
        let mut rx = channel.subscribe("conn-1");
        assert_eq!(channel.subscriber_count(), 1);

        let count = channel.publish(Message::new("drivers", "RideRequest", Payload::new()));
        assert_eq!(count, 1);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.event, "RideRequest");

        assert!(channel.unsubscribe("conn-1"));
        assert!(!channel.unsubscribe("conn-1"));
        assert!(channel.is_empty());
    }
}
