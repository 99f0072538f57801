//! Realtime subscriber endpoint.
//!
//! Rider and driver apps connect here to follow `ride.{rideId}`, `drivers`
//! and the other registered channels. Subscriptions are authorized through
//! the channel registry and served by the local broker's router.
//!
//! A connection answers in the encoding of the last message it received:
//! JSON text frames by default, MessagePack once the client sends binary.

use crate::metrics::{self, ConnectionMetricsGuard};
use crate::state::AppState;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use ridecast_core::{ChannelName, ChannelRegistry, Identity, Message, Router, RouterError};
use ridecast_protocol::{codec, codes, Encoded, Encoding, Frame, PROTOCOL_VERSION};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use uuid::Uuid;

type Outbound = mpsc::UnboundedSender<(String, Arc<Message>)>;

/// WebSocket upgrade handler.
pub(crate) async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    let Some(router) = state.router().cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, router))
}

/// Subscription state of one connection, independent of the socket.
pub struct Session {
    connection_id: String,
    identity: Identity,
    heartbeat: u32,
    registry: Arc<ChannelRegistry>,
    router: Arc<Router>,
    forwards: HashMap<String, JoinHandle<()>>,
    outbound: Outbound,
}

impl Session {
    #[must_use]
    pub fn new(
        connection_id: impl Into<String>,
        heartbeat: u32,
        registry: Arc<ChannelRegistry>,
        router: Arc<Router>,
        outbound: Outbound,
    ) -> Self {
        Self {
            connection_id: connection_id.into(),
            identity: Identity::Anonymous,
            heartbeat,
            registry,
            router,
            forwards: HashMap::new(),
            outbound,
        }
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The greeting sent when the socket opens.
    #[must_use]
    pub fn connected(&self) -> Frame {
        Frame::connected(&self.connection_id, self.heartbeat)
    }

    /// Handle one client frame, returning the reply if there is one.
    ///
    /// Must be called from within a Tokio runtime: accepted subscriptions
    /// spawn a forwarding task.
    ///
    /// The identity from `connect` is unauthenticated: any client can claim
    /// any user and pass that user's private channel check.
    pub fn handle(&mut self, frame: Frame) -> Option<Frame> {
        match frame {
            Frame::Connect { version, identity } => {
                if version != PROTOCOL_VERSION {
                    return Some(Frame::error(
                        0,
                        codes::BAD_REQUEST,
                        format!("Unsupported protocol version {version}"),
                    ));
                }
                self.identity = identity.map_or(Identity::Anonymous, Identity::User);
                debug!(connection = %self.connection_id, identity = %self.identity, "Connect");
                Some(self.connected())
            }
            Frame::Subscribe { id, channel } => Some(self.subscribe(id, channel)),
            Frame::Unsubscribe { id, channel } => Some(self.unsubscribe(id, &channel)),
            Frame::Ping { timestamp } => Some(Frame::pong(timestamp)),
            Frame::Pong { .. } => None,
            other => {
                warn!(connection = %self.connection_id, frame_type = other.kind(), "Unexpected frame type");
                Some(Frame::error(
                    0,
                    codes::BAD_REQUEST,
                    format!("Unexpected {} frame", other.kind()),
                ))
            }
        }
    }

    fn subscribe(&mut self, id: u64, channel: String) -> Frame {
        debug!(connection = %self.connection_id, channel = %channel, "Subscribe request");

        let name = match ChannelName::parse(channel) {
            Ok(name) => name,
            Err(e) => return Frame::error(id, codes::BAD_REQUEST, e.to_string()),
        };
        if !self.registry.authorize(name.as_str(), &self.identity) {
            warn!(connection = %self.connection_id, channel = %name, identity = %self.identity, "Subscribe denied");
            return Frame::error(id, codes::FORBIDDEN, format!("Not authorized for channel {name}"));
        }

        match self.router.subscribe(&self.connection_id, &name) {
            Ok(rx) => {
                let handle = tokio::spawn(forward(name.to_string(), rx, self.outbound.clone()));
                self.forwards.insert(name.to_string(), handle);
                metrics::record_subscription();
                metrics::set_active_channels(self.router.stats().channel_count);
                Frame::ack(id)
            }
            Err(e) => {
                warn!(connection = %self.connection_id, channel = %name, error = %e, "Subscribe failed");
                let code = match e {
                    RouterError::AlreadySubscribed(_) => codes::CONFLICT,
                    RouterError::MaxSubscriptionsReached | RouterError::MaxChannelsReached => codes::LIMIT_REACHED,
                    RouterError::NotSubscribed(_) => codes::INTERNAL,
                };
                Frame::error(id, code, e.to_string())
            }
        }
    }

    fn unsubscribe(&mut self, id: u64, channel: &str) -> Frame {
        debug!(connection = %self.connection_id, channel = %channel, "Unsubscribe request");

        if let Some(handle) = self.forwards.remove(channel) {
            handle.abort();
        }
        match self.router.unsubscribe(&self.connection_id, channel) {
            Ok(()) => {
                metrics::set_active_channels(self.router.stats().channel_count);
                Frame::ack(id)
            }
            Err(e) => Frame::error(id, codes::NOT_SUBSCRIBED, e.to_string()),
        }
    }

    /// Drop every subscription of this connection.
    pub fn close(mut self) {
        for (_, handle) in self.forwards.drain() {
            handle.abort();
        }
        self.router.unsubscribe_all(&self.connection_id);
        metrics::set_active_channels(self.router.stats().channel_count);
    }
}

/// Move messages from one channel's broadcast receiver onto the connection's
/// merged outbound queue.
async fn forward(channel: String, mut rx: broadcast::Receiver<Arc<Message>>, outbound: Outbound) {
    loop {
        match rx.recv().await {
            Ok(message) => {
                if outbound.send((channel.clone(), message)).is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(channel = %channel, skipped, "Subscriber lagged, messages dropped");
            }
        }
    }
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, router: Arc<Router>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = format!("conn_{}", Uuid::new_v4().simple());
    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();
    let (sub_tx, mut sub_rx) = mpsc::unbounded_channel();
    let heartbeat = u32::try_from(state.config.heartbeat.interval_ms).unwrap_or(u32::MAX);
    let mut session = Session::new(connection_id.clone(), heartbeat, Arc::clone(&state.registry), router, sub_tx);

    let mut encoding = Encoding::Text;
    if send_frame(&mut sender, encoding, &session.connected()).await.is_err() {
        error!(connection = %connection_id, "Failed to send connected frame");
        session.close();
        return;
    }

    let mut read_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            biased;

            Some((channel, message)) = sub_rx.recv() => {
                let frame = Frame::event(channel, message.event.clone(), message.payload_value());
                if send_frame(&mut sender, encoding, &frame).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                let mut replies = Vec::new();
                match msg {
                    Some(Ok(WsMessage::Text(text))) => {
                        encoding = Encoding::Text;
                        match codec::decode_text(&text) {
                            Ok(frame) => replies.extend(session.handle(frame)),
                            Err(e) => replies.push(Frame::error(0, codes::BAD_REQUEST, e.to_string())),
                        }
                    }
                    Some(Ok(WsMessage::Binary(data))) => {
                        encoding = Encoding::Binary;
                        read_buffer.extend_from_slice(&data);
                        loop {
                            match codec::decode_from(&mut read_buffer) {
                                Ok(Some(frame)) => replies.extend(session.handle(frame)),
                                Ok(None) => break,
                                Err(e) => {
                                    read_buffer.clear();
                                    replies.push(Frame::error(0, codes::BAD_REQUEST, e.to_string()));
                                    break;
                                }
                            }
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if sender.send(WsMessage::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Pong(_))) => {}
                    Some(Ok(WsMessage::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }

                let mut closed = false;
                for reply in &replies {
                    if send_frame(&mut sender, encoding, reply).await.is_err() {
                        closed = true;
                        break;
                    }
                }
                if closed {
                    break;
                }
            }
        }
    }

    session.close();
    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Send a frame in the connection's encoding. Frames that fail to encode are
/// logged and skipped.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    encoding: Encoding,
    frame: &Frame,
) -> Result<(), axum::Error> {
    let message = match encoding.encode(frame) {
        Ok(Encoded::Text(text)) => WsMessage::Text(text),
        Ok(Encoded::Binary(data)) => WsMessage::Binary(data.to_vec()),
        Err(e) => {
            error!(frame_type = frame.kind(), error = %e, "Failed to encode frame");
            return Ok(());
        }
    };
    sender.send(message).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use ridecast_core::Payload;
    use serde_json::json;

    fn session() -> (Session, Arc<Router>, mpsc::UnboundedReceiver<(String, Arc<Message>)>) {
        let router = Arc::new(Router::new());
        let registry = Arc::new(ChannelRegistry::ride_hailing().unwrap());
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new("conn_test", 30_000, registry, Arc::clone(&router), tx);
        (session, router, rx)
    }

    fn error_code(frame: Option<Frame>) -> u16 {
        match frame {
            Some(Frame::Error { code, .. }) => code,
            other => panic!("Expected error frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_anonymous_may_follow_a_ride() {
        let (mut session, router, _rx) = session();
        assert_eq!(session.handle(Frame::subscribe(1, "ride.r1")), Some(Frame::ack(1)));
        assert_eq!(router.subscriber_count("ride.r1"), 1);
    }

    #[tokio::test]
    async fn test_private_channel_requires_matching_identity() {
        let (mut session, _router, _rx) = session();
        assert_eq!(
            error_code(session.handle(Frame::subscribe(1, "App.Models.User.42"))),
            codes::FORBIDDEN
        );

        session.handle(Frame::connect(Some("7".into())));
        assert_eq!(
            error_code(session.handle(Frame::subscribe(2, "App.Models.User.42"))),
            codes::FORBIDDEN
        );

        let reply = session.handle(Frame::connect(Some("42".into())));
        assert!(matches!(reply, Some(Frame::Connected { .. })));
        assert_eq!(session.identity(), &Identity::user("42"));
        assert_eq!(
            session.handle(Frame::subscribe(3, "App.Models.User.42")),
            Some(Frame::ack(3))
        );
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_channels() {
        let (mut session, _router, _rx) = session();
        assert_eq!(error_code(session.handle(Frame::subscribe(1, "$internal"))), codes::BAD_REQUEST);
        assert_eq!(error_code(session.handle(Frame::subscribe(2, "payments"))), codes::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_duplicate_subscribe_and_stray_unsubscribe() {
        let (mut session, _router, _rx) = session();
        session.handle(Frame::subscribe(1, "drivers"));
        assert_eq!(error_code(session.handle(Frame::subscribe(2, "drivers"))), codes::CONFLICT);
        assert_eq!(error_code(session.handle(Frame::unsubscribe(3, "chat"))), codes::NOT_SUBSCRIBED);
        assert_eq!(session.handle(Frame::unsubscribe(4, "drivers")), Some(Frame::ack(4)));
    }

    #[tokio::test]
    async fn test_subscribed_events_are_forwarded() {
        let (mut session, router, mut rx) = session();
        session.handle(Frame::subscribe(1, "ride.r1"));

        let mut payload = Payload::new();
        payload.insert("rideId".into(), json!("r1"));
        router.publish(Message::new("ride.r1", "DriverPickedUp", payload));

        let (channel, message) = rx.recv().await.unwrap();
        assert_eq!(channel, "ride.r1");
        assert_eq!(message.event, "DriverPickedUp");
        assert_eq!(message.payload_value(), json!({"rideId": "r1"}));
    }

    #[tokio::test]
    async fn test_client_cannot_publish() {
        let (mut session, _router, _rx) = session();
        let frame = Frame::event("drivers", "RideRequest", json!({}));
        assert_eq!(error_code(session.handle(frame)), codes::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_ping_and_version_check() {
        let (mut session, _router, _rx) = session();
        assert_eq!(
            session.handle(Frame::Ping { timestamp: Some(5) }),
            Some(Frame::pong(Some(5)))
        );
        assert_eq!(session.handle(Frame::Pong { timestamp: None }), None);

        let frame = Frame::Connect {
            version: PROTOCOL_VERSION + 1,
            identity: None,
        };
        assert_eq!(error_code(session.handle(frame)), codes::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_close_drops_every_subscription() {
        let (mut session, router, _rx) = session();
        session.handle(Frame::subscribe(1, "chat"));
        session.handle(Frame::subscribe(2, "ride.r1"));
        session.close();

        assert!(router.connection_channels("conn_test").is_empty());
        assert!(!router.channel_exists("chat"));
    }
}
