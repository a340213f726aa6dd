//! # liveframe-transport
//!
//! Transport abstraction layer for liveframe.
//!
//! The view engine talks to clients only through the [`Transport`] trait:
//! `send(connection_id, bytes)`, fire-and-forget. [`ChannelTransport`] is
//! the implementation the server uses, one unbounded queue per connection
//! drained by the task that owns the socket.
//!
//! ```rust
//! use bytes::Bytes;
//! use liveframe_transport::{ChannelTransport, ConnectionId, Transport};
//!
//! let transport = ChannelTransport::new();
//! let id = ConnectionId::new("conn-1");
//! let mut outbound = transport.register(id.clone());
//!
//! transport.send(&id, Bytes::from_static(b"[]")).unwrap();
//! assert_eq!(outbound.try_recv().unwrap(), Bytes::from_static(b"[]"));
//! ```

pub mod channel;
pub mod traits;

pub use channel::{ChannelTransport, Outbound};
pub use traits::{ConnectionId, Transport, TransportError};
