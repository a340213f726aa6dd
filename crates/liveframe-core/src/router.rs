//! Per-connection message router.
//!
//! A [`ConnectionRouter`] decodes each inbound message and dispatches it by
//! kind: joins mount a component on a topic, events and patches go to the
//! topic's manager, leaves tear it down and heartbeats are answered
//! directly.

use dashmap::DashMap;
use liveframe_protocol::{decode, encode, EventPayload, Kind, Message, ProtocolError, Reply};
use liveframe_transport::{ConnectionId, Transport};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::component::{MountParams, Params};
use crate::manager::TopicManager;
use crate::routes::{resolve_url, RouteTable};
use crate::session::{SessionCodec, SessionData, SessionError};

/// Router errors.
///
/// Each one is fatal to the message that caused it; no reply is sent.
#[derive(Debug, Error)]
pub enum RouterError {
    /// Message could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Join payload is missing a required field.
    #[error("{0}")]
    JoinValidation(&'static str),

    /// URL in the message could not be parsed.
    #[error("Invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// No component is registered at the joined path.
    #[error("no component found for {0}")]
    RouteNotFound(String),

    /// Session or static blob failed verification.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Kind has no dispatch rule on the server.
    #[error("unexpected protocol event: {0}")]
    UnknownEvent(String),

    /// Connection already joined the maximum number of topics.
    #[error("Maximum topics reached: {0}")]
    TooManyTopics(usize),
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Maximum topics joined at once on one connection.
    pub max_topics: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { max_topics: 100 }
    }
}

/// Live sessions by topic. Sessions remove themselves on shutdown.
pub(crate) type Topics = DashMap<String, Arc<TopicManager>>;

/// Routes the messages of one connection to its topic sessions.
pub struct ConnectionRouter {
    topics: Arc<Topics>,
    transport: Arc<dyn Transport>,
    session_codec: Arc<dyn SessionCodec>,
    config: RouterConfig,
}

impl ConnectionRouter {
    /// Create a router with default configuration.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, session_codec: Arc<dyn SessionCodec>) -> Self {
        Self::with_config(transport, session_codec, RouterConfig::default())
    }

    /// Create a router with custom configuration.
    #[must_use]
    pub fn with_config(
        transport: Arc<dyn Transport>,
        session_codec: Arc<dyn SessionCodec>,
        config: RouterConfig,
    ) -> Self {
        Self {
            topics: Arc::new(DashMap::new()),
            transport,
            session_codec,
            config,
        }
    }

    /// Decode and dispatch one inbound message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be decoded or a join is
    /// rejected. Component failures are answered with an error reply and do
    /// not surface here.
    pub fn on_message(
        &self,
        data: &[u8],
        routes: &RouteTable,
        connection_id: &ConnectionId,
        signing_secret: &str,
    ) -> Result<(), RouterError> {
        let message = decode(data)?;
        self.dispatch(&message, routes, connection_id, signing_secret)
    }

    /// Dispatch one decoded message.
    ///
    /// # Errors
    ///
    /// See [`on_message`](Self::on_message).
    pub fn dispatch(
        &self,
        message: &Message,
        routes: &RouteTable,
        connection_id: &ConnectionId,
        signing_secret: &str,
    ) -> Result<(), RouterError> {
        trace!(topic = %message.topic, kind = %message.kind, connection = %connection_id, "Dispatching");

        match message.kind {
            Kind::Join => self.join(message, routes, connection_id, signing_secret),
            Kind::Heartbeat => {
                send_message(
                    self.transport.as_ref(),
                    connection_id,
                    &Reply::heartbeat(message).into(),
                );
                Ok(())
            }
            Kind::Event => self.event(message, connection_id),
            Kind::LivePatch => self.live_patch(message, connection_id),
            Kind::Leave => {
                if self.remove(&message.topic).is_some() {
                    debug!(topic = %message.topic, connection = %connection_id, "Left topic");
                }
                Ok(())
            }
            Kind::Reply | Kind::Diff => Err(RouterError::UnknownEvent(message.kind.to_string())),
        }
    }

    fn join(
        &self,
        message: &Message,
        routes: &RouteTable,
        connection_id: &ConnectionId,
        signing_secret: &str,
    ) -> Result<(), RouterError> {
        let payload = message.join_payload()?;
        let target = payload
            .target()
            .ok_or(RouterError::JoinValidation("no url or redirect in join message"))?;
        let url = resolve_url(target).map_err(|source| RouterError::InvalidUrl {
            url: target.to_string(),
            source,
        })?;

        let route = routes
            .get(url.path())
            .ok_or_else(|| RouterError::RouteNotFound(url.path().to_string()))?;

        let session = match &payload.session {
            Some(blob) => self.session_codec.verify(blob, signing_secret)?,
            None => SessionData::empty(),
        };
        if let Some(blob) = &payload.static_token {
            self.session_codec.verify(blob, signing_secret)?;
        }

        let mut params = match payload.params {
            Value::Null => MountParams::default(),
            params => serde_json::from_value::<MountParams>(params).map_err(|source| {
                ProtocolError::Payload {
                    kind: "phx_join",
                    source,
                }
            })?,
        };
        for (key, value) in url.query_pairs() {
            params
                .extra
                .entry(key.into_owned())
                .or_insert_with(|| Value::String(value.into_owned()));
        }

        if let Some(previous) = self.remove(&message.topic) {
            debug!(topic = %message.topic, join_ref = ?previous.join_ref(), "Replacing session");
        }
        if self.topics.len() >= self.config.max_topics {
            return Err(RouterError::TooManyTopics(self.config.max_topics));
        }

        let manager = TopicManager::new(
            &message.topic,
            message.join_ref.clone(),
            connection_id.clone(),
            Arc::clone(&self.transport),
            route,
        );
        match manager.mount(message, &params, &session) {
            Ok(_) => {
                info!(topic = %message.topic, path = url.path(), connection = %connection_id, "Joined");
                manager.attach(Arc::downgrade(&self.topics));
                self.topics.insert(message.topic.clone(), Arc::clone(&manager));
                // A deferred message may have failed the session before it was attached.
                if !manager.is_healthy() {
                    self.topics
                        .remove_if(&message.topic, |_, current| Arc::ptr_eq(current, &manager));
                }
            }
            Err(error) => {
                debug!(topic = %message.topic, error = %error, "Join rejected by component");
            }
        }
        Ok(())
    }

    fn event(&self, message: &Message, connection_id: &ConnectionId) -> Result<(), RouterError> {
        let Some(manager) = self.get(&message.topic) else {
            trace!(topic = %message.topic, connection = %connection_id, "Event for unknown topic");
            return Ok(());
        };
        let payload = message.event_payload()?;
        let params = event_params(&payload);

        if manager
            .handle_event(message, &payload.event, &params)
            .is_err()
        {
            self.remove(&message.topic);
        }
        Ok(())
    }

    fn live_patch(&self, message: &Message, connection_id: &ConnectionId) -> Result<(), RouterError> {
        let Some(manager) = self.get(&message.topic) else {
            trace!(topic = %message.topic, connection = %connection_id, "Patch for unknown topic");
            return Ok(());
        };
        let payload = message.live_patch_payload()?;
        let url = resolve_url(&payload.url).map_err(|source| RouterError::InvalidUrl {
            url: payload.url.clone(),
            source,
        })?;

        if manager.handle_live_patch(message, &url).is_err() {
            self.remove(&message.topic);
        }
        Ok(())
    }

    /// The live session of a topic.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<Arc<TopicManager>> {
        let manager = self.topics.get(topic).map(|entry| Arc::clone(entry.value()))?;
        if manager.is_healthy() {
            return Some(manager);
        }
        self.topics
            .remove_if(topic, |_, current| Arc::ptr_eq(current, &manager));
        None
    }

    /// Shut down and remove the session of a topic.
    pub fn remove(&self, topic: &str) -> Option<Arc<TopicManager>> {
        let (_, manager) = self.topics.remove(topic)?;
        manager.shutdown();
        Some(manager)
    }

    /// Joined topics, in no particular order.
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|entry| entry.key().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.topics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Shut down every session.
    pub fn close(&self) {
        let topics = self.topics();
        for topic in &topics {
            self.remove(topic);
        }
        if !topics.is_empty() {
            debug!(count = topics.len(), "Closed all sessions");
        }
    }
}

impl Drop for ConnectionRouter {
    fn drop(&mut self) {
        self.close();
    }
}

/// Event values arrive as an object, a form-encoded string or a scalar.
fn event_params(payload: &EventPayload) -> Params {
    match &payload.value {
        Value::Object(map) => map.clone(),
        Value::Null => Params::new(),
        Value::String(encoded) if payload.event_type == "form" => {
            url::form_urlencoded::parse(encoded.as_bytes())
                .into_owned()
                .map(|(key, value)| (key, Value::String(value)))
                .collect()
        }
        other => {
            let mut params = Params::new();
            params.insert("value".to_string(), other.clone());
            params
        }
    }
}

/// Encode and send, logging failures.
pub(crate) fn send_message(transport: &dyn Transport, connection_id: &ConnectionId, message: &Message) {
    let bytes = match encode(message) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(topic = %message.topic, error = %e, "Failed to encode message");
            return;
        }
    };
    if let Err(e) = transport.send(connection_id, bytes) {
        debug!(topic = %message.topic, transport = transport.name(), error = %e, "Dropping outbound message");
    }
}
