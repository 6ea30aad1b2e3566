//! Keyrelay - Protocol Types
//!
//! Wire-level types shared by the transport and the relay server:
//! the `/<keyboard>/<signal>` request path, the signal value carried in the
//! request body, the JSON message pushed to registered keyboards, and the
//! client-facing error texts.

pub mod error;
pub mod keyboard;
pub mod message;
pub mod signal;

pub use error::{DispatchError, IdentifierError};
pub use keyboard::KeyboardId;
pub use message::RelayMessage;
pub use signal::{SignalPath, SignalValue, NO_SIGNAL};
