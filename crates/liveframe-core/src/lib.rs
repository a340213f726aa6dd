//! # liveframe-core
//!
//! Server-rendered components kept in sync with the browser by diffs.
//!
//! This crate provides:
//!
//! - **Template** - `html!` templates, parts trees and structural diffs
//! - **Component** - The trait application code implements
//! - **Manager** - The session of one component on one topic
//! - **Router** - Dispatch of one connection's messages to its sessions
//! - **Session** - Verification of the signed session blobs sent on join
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌──────────────┐
//! │  Connection │────▶│ ConnectionRouter │────▶│ TopicManager │
//! └─────────────┘     └──────────────────┘     └──────────────┘
//!        ▲                     │                       │
//!        │                     ▼                       ▼
//!        │              ┌────────────┐          ┌────────────┐
//!        └──────────────│ Transport  │◀─────────│ Component  │
//!          replies      └────────────┘  diffs   └────────────┘
//! ```

pub mod component;
pub mod manager;
pub mod router;
pub mod routes;
pub mod session;
pub mod socket;
pub mod template;

pub use component::{Capabilities, Component, ComponentError, ComponentResult, MountParams, Params};
pub use manager::{ManagerError, TopicManager};
pub use router::{ConnectionRouter, RouterConfig, RouterError};
pub use routes::{resolve_url, Route, RouteTable};
pub use session::{JwtSessionCodec, SessionCodec, SessionData, SessionError};
pub use socket::Socket;
pub use template::{Html, Parts, TemplateError, Update};
