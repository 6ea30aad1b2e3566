//! Keyrelay error types.
//!
//! `DispatchError` is what an HTTP caller sees; its `Display` output is the
//! exact plain-text response body.

use thiserror::Error;

/// Client errors produced while dispatching one signal request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The path has no `/<signal>` segment, or one of the segments is empty.
    #[error("Malformed signal path.")]
    MalformedPath,

    /// The body is neither an integer nor the `nosignal` sentinel.
    #[error("Unknown signal value.")]
    UnknownSignalValue,

    /// No connection is registered under the requested keyboard.
    #[error("Keyboard not found.")]
    KeyboardNotFound,
}

impl DispatchError {
    /// Whether the error means "nothing to talk to" rather than "bad request".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyboardNotFound)
    }
}

/// Reasons a registration message is not accepted as a keyboard identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    #[error("keyboard identifier is empty")]
    Empty,

    #[error("keyboard identifier is {len} bytes, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("keyboard identifier contains invalid character {0:?}")]
    InvalidCharacter(char),
}
