//! Keyboard identifiers.
//!
//! A keyboard registers by sending its identifier as a WebSocket text frame.
//! The identifier is otherwise opaque; the only checks are the ones needed to
//! keep it addressable through `/<keyboard>/<signal>` and bounded in size.
//! Spaces, `?`, `#`, `%` and non-ASCII text are fine: callers percent-encode
//! them in the request path, and the path segment is decoded before lookup.

use std::borrow::Borrow;
use std::fmt;

use crate::error::IdentifierError;

/// A validated keyboard identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyboardId(String);

impl KeyboardId {
    /// Maximum identifier length in bytes.
    pub const MAX_LEN: usize = 256;

    /// Validate a registration message as an identifier.
    ///
    /// Rejects empty input, input longer than [`Self::MAX_LEN`] bytes, `/`
    /// (it would split the request path) and control characters.
    pub fn parse(raw: &str) -> Result<Self, IdentifierError> {
        if raw.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if raw.len() > Self::MAX_LEN {
            return Err(IdentifierError::TooLong {
                len: raw.len(),
                max: Self::MAX_LEN,
            });
        }
        if let Some(c) = raw.chars().find(|c| *c == '/' || c.is_control()) {
            return Err(IdentifierError::InvalidCharacter(c));
        }
        Ok(Self(raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for KeyboardId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyboardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
