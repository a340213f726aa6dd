//! Transport abstraction traits for liveframe.
//!
//! The view engine only ever pushes encoded messages toward a connection;
//! reading from the socket belongs to whoever owns it.

use bytes::Bytes;
use std::fmt;
use thiserror::Error;

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a connection ID unique within this process.
    #[must_use]
    pub fn generate() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::time::{SystemTime, UNIX_EPOCH};

        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}_{:x}", timestamp, counter))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection was closed.
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// No connection registered under this ID.
    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),
}

/// Outbound side of a transport.
///
/// Sending is fire-and-forget: implementations queue the data and return
/// without waiting for delivery. Backpressure and ordering across
/// connections are the transport's concern.
pub trait Transport: Send + Sync {
    /// Queue encoded data for delivery to a connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unknown or already closed.
    fn send(&self, connection_id: &ConnectionId, data: Bytes) -> Result<(), TransportError>;

    /// Get the transport name (e.g., "channel", "websocket").
    fn name(&self) -> &'static str;
}
