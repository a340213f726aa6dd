//! Connection handlers for the liveframe server.
//!
//! Each WebSocket connection gets its own [`ConnectionRouter`]. Text frames
//! carry one protocol message each; replies and pushes come back through
//! the connection's outbound queue.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use liveframe_core::{
    ConnectionRouter, JwtSessionCodec, RouteTable, RouterConfig, RouterError, SessionCodec,
};
use liveframe_protocol::{decode, Kind, Message as LiveMessage};
use liveframe_transport::{ChannelTransport, ConnectionId, Transport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Components by path.
    pub routes: RouteTable,
    /// Outbound queues of every connection.
    pub transport: Arc<ChannelTransport>,
    /// Verifies join session blobs.
    pub session_codec: Arc<dyn SessionCodec>,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config, routes: RouteTable) -> Self {
        Self {
            config,
            routes,
            transport: Arc::new(ChannelTransport::new()),
            session_codec: Arc::new(JwtSessionCodec::new()),
        }
    }

    fn router_config(&self) -> RouterConfig {
        RouterConfig {
            max_topics: self.config.limits.max_topics_per_connection,
        }
    }
}

/// Build the HTTP application.
pub fn app(state: Arc<AppState>) -> Router {
    let websocket_path = state.config.transport.websocket_path.clone();
    Router::new()
        .route(&websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config, routes: RouteTable) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("liveframe server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    serve(listener, Arc::new(AppState::new(config, routes))).await
}

/// Serve the application on an already bound listener.
///
/// # Errors
///
/// Returns an error if serving fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": state.transport.connection_count(),
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle a WebSocket connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let connection_id = ConnectionId::generate();
    let mut outbound = state.transport.register(connection_id.clone());
    let transport: Arc<dyn Transport> = state.transport.clone();
    let router = ConnectionRouter::with_config(
        transport,
        Arc::clone(&state.session_codec),
        state.router_config(),
    );

    debug!(connection = %connection_id, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    let timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);
    let idle = tokio::time::sleep(timeout);
    tokio::pin!(idle);
    // Sessions can leave the router between messages, so the gauge tracks
    // the last count reported rather than a per-message delta.
    let mut reported_topics = 0;

    loop {
        tokio::select! {
            biased;

            // Replies and pushes queued by the router
            Some(data) = outbound.recv() => {
                metrics::record_message(data.len(), "outbound");
                let text = match String::from_utf8(data.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(connection = %connection_id, error = %e, "Dropping non-utf8 message");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            // Receive from WebSocket
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        idle.as_mut().reset(tokio::time::Instant::now() + timeout);
                        handle_inbound(&router, &state, &connection_id, text.as_bytes());
                        metrics::record_topics(reported_topics, router.len());
                        reported_topics = router.len();
                    }
                    Some(Ok(Message::Binary(data))) => {
                        idle.as_mut().reset(tokio::time::Instant::now() + timeout);
                        handle_inbound(&router, &state, &connection_id, &data);
                        metrics::record_topics(reported_topics, router.len());
                        reported_topics = router.len();
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                }
            }

            () = &mut idle => {
                warn!(connection = %connection_id, timeout_ms = state.config.heartbeat.timeout_ms, "Heartbeat timeout");
                metrics::record_error("heartbeat_timeout");
                break;
            }
        }
    }

    // Cleanup: shut down every session, then drop the outbound queue
    metrics::record_topics(reported_topics, 0);
    router.close();
    state.transport.unregister(&connection_id);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Dispatch one inbound message. Rejected messages are logged; the
/// connection stays open.
fn handle_inbound(
    router: &ConnectionRouter,
    state: &AppState,
    connection_id: &ConnectionId,
    data: &[u8],
) {
    let start = Instant::now();
    metrics::record_message(data.len(), "inbound");

    let dispatched = decode(data).map_err(RouterError::from).and_then(|message| {
        router.dispatch(
            &message,
            &state.routes,
            connection_id,
            &state.config.session.signing_secret,
        )?;
        Ok(message)
    });
    match dispatched {
        Ok(message) if mounted_join(router, &message) => metrics::record_join(),
        Ok(_) => {}
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Message rejected");
            metrics::record_error(error_type(&e));
        }
    }

    metrics::record_dispatch(start.elapsed().as_secs_f64());
}

/// A join that left a live session on its topic, replacements included.
fn mounted_join(router: &ConnectionRouter, message: &LiveMessage) -> bool {
    message.kind == Kind::Join && router.get(&message.topic).is_some()
}

fn error_type(error: &RouterError) -> &'static str {
    match error {
        RouterError::Protocol(_) => "protocol",
        RouterError::JoinValidation(_) | RouterError::InvalidUrl { .. } => "join_validation",
        RouterError::RouteNotFound(_) => "route_not_found",
        RouterError::Session(_) => "session",
        RouterError::UnknownEvent(_) => "unknown_event",
        RouterError::TooManyTopics(_) => "too_many_topics",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo;
    use serde_json::json;

    const SECRET: &str = "handler-secret";

    fn join(path: &str) -> LiveMessage {
        let session = JwtSessionCodec::new().sign(&json!({}), SECRET).unwrap();
        let payload = json!({"url": format!("http://localhost{path}"), "session": session});
        LiveMessage::new(Some("1".into()), Some("1".into()), "lv:1", Kind::Join, payload)
    }

    #[test]
    fn test_mounted_join_counts_rejoins() {
        let transport = Arc::new(ChannelTransport::new());
        let connection_id = ConnectionId::new("conn");
        let _outbound = transport.register(connection_id.clone());
        let router = ConnectionRouter::new(transport, Arc::new(JwtSessionCodec::new()));
        let routes = demo::routes();

        for _ in 0..2 {
            let message = join("/light");
            router.dispatch(&message, &routes, &connection_id, SECRET).unwrap();
            assert!(mounted_join(&router, &message));
        }
        assert_eq!(router.len(), 1);

        let heartbeat = LiveMessage::new(None, Some("2".into()), "phoenix", Kind::Heartbeat, json!({}));
        router.dispatch(&heartbeat, &routes, &connection_id, SECRET).unwrap();
        assert!(!mounted_join(&router, &heartbeat));
    }

    #[test]
    fn test_error_type_labels() {
        assert_eq!(error_type(&RouterError::RouteNotFound("/x".into())), "route_not_found");
        assert_eq!(error_type(&RouterError::TooManyTopics(1)), "too_many_topics");
    }
}
