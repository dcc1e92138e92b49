//! Connection lifecycle and message relay engine.
//!
//! A [`Gateway`] owns the presence registry, the store handle, the notifier
//! and the intake gate. The server hands it one upgraded [`Connection`] per
//! WebSocket together with the [`Endpoint`] it arrived on.

pub mod auth;
pub mod connection;
pub mod delivery;
pub mod deregister;
pub mod error;
pub mod gateway;
pub mod notify;
pub mod register;
pub mod registry;
pub mod relay;
pub mod store;
pub mod supervisor;

#[cfg(test)]
mod testing;

pub use connection::{Connection, ConnectionHandle};
pub use error::SessionError;
pub use gateway::{Endpoint, Gateway};
pub use notify::{Notice, Notifier, NullNotifier, TerminalBell, TracingNotifier};
pub use registry::PresenceRegistry;
pub use supervisor::{Gate, Shutdown, Supervisor, SupervisorConfig};
