//! Keyrelay Transport Layer
//!
//! Serves signal requests over HTTP and keyboard connections over WebSocket
//! on a single listener. The transport handles:
//! - Routing plain requests to the dispatcher and upgrades to `/listen`
//! - Aborting upgrades to any other path
//! - Per-connection outbound queues and connection lifecycle
//! - Idempotent graceful shutdown
//!
//! The transport is decoupled from the registry via the `RelayHandler` trait.

pub mod client;
pub mod config;
pub mod server;

pub use client::{ConnectionHandle, PushError};
pub use config::{ErrorStatusPolicy, ListenAddr, TransportConfig, DEFAULT_LISTEN, LISTEN_PATH};
pub use server::{RelayHandler, ShutdownHandle, TransportError, TransportServer};
