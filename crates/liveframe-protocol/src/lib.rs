//! # liveframe-protocol
//!
//! Wire protocol definitions for liveframe, a server-rendered view engine
//! that keeps remote clients in sync by shipping structural diffs.
//!
//! Every message is a JSON array of five positional fields:
//!
//! ```text
//! [joinRef | null, messageRef | null, topic, kind, payload]
//! ```
//!
//! ## Kinds
//!
//! - `phx_join` - Mount a component on a topic
//! - `heartbeat` - Connection keepalive
//! - `event` / `live_patch` - UI events and navigation
//! - `phx_leave` - Tear down a topic
//! - `phx_reply` / `diff` - Server replies and pushes
//!
//! ## Example
//!
//! ```rust
//! use liveframe_protocol::{codec, Reply};
//!
//! let message = codec::decode(br#"[null, "1", "phoenix", "heartbeat", {}]"#).unwrap();
//! let encoded = codec::encode(&Reply::heartbeat(&message).into()).unwrap();
//!
//! let value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
//! assert_eq!(
//!     value,
//!     serde_json::json!([null, "1", "phoenix", "phx_reply", {"status": "ok", "response": {}}])
//! );
//! ```

pub mod codec;
pub mod message;

pub use codec::{decode, encode, ProtocolError};
pub use message::{
    EventPayload, JoinPayload, Kind, LivePatchPayload, Message, Reply, Status,
};
