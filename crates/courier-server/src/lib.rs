//! HTTP surface of the relay: the WebSocket routes, the health check and
//! the environment configuration. `main.rs` wires them to a listener.

pub mod app;
pub mod config;
