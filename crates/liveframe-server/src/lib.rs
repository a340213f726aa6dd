//! # liveframe-server
//!
//! WebSocket endpoint, configuration and metrics for serving liveframe
//! components, plus the demo components the `liveframe` binary mounts.

pub mod config;
pub mod demo;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use handlers::{app, run_server, serve, AppState};
