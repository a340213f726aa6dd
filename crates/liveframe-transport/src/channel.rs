//! Channel-backed transport.
//!
//! Each registered connection gets an unbounded queue. The task that owns
//! the real socket drains the receiver and writes frames out.

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::traits::{ConnectionId, Transport, TransportError};

/// Receiving half handed to the socket writer.
pub type Outbound = mpsc::UnboundedReceiver<Bytes>;

/// Transport that routes outbound data through per-connection queues.
#[derive(Debug, Default)]
pub struct ChannelTransport {
    queues: DashMap<ConnectionId, mpsc::UnboundedSender<Bytes>>,
}

impl ChannelTransport {
    /// Create an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return the receiver for its outbound data.
    ///
    /// Registering an ID twice replaces the previous queue.
    pub fn register(&self, connection_id: ConnectionId) -> Outbound {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(connection = %connection_id, "Connection registered");
        self.queues.insert(connection_id, tx);
        rx
    }

    /// Remove a connection.
    ///
    /// Returns `true` if the connection was registered.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.queues.remove(connection_id).is_some();
        if removed {
            debug!(connection = %connection_id, "Connection unregistered");
        }
        removed
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.queues.len()
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.queues.contains_key(connection_id)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, connection_id: &ConnectionId, data: Bytes) -> Result<(), TransportError> {
        let queue = self
            .queues
            .get(connection_id)
            .ok_or_else(|| TransportError::UnknownConnection(connection_id.clone()))?;

        trace!(connection = %connection_id, bytes = data.len(), "Queueing outbound data");
        queue
            .send(data)
            .map_err(|_| TransportError::ConnectionClosed(connection_id.clone()))
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}
