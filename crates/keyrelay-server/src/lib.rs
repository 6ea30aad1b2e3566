//! Keyrelay Server — keyboard registry and signal relay.
//!
//! The server owns the registry and the dispatcher, and provides the
//! `RelayHandler` implementation for the transport layer.

pub mod dispatch;
pub mod registry;
pub mod router;

pub use dispatch::RelayDispatcher;
pub use registry::KeyboardRegistry;
pub use router::RelayServer;
