//! Signal requests: the `/<keyboard>/<signal>` path and the body value.

use std::fmt;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DispatchError;

/// Body text (and wire value) meaning "signal without a numeric value".
pub const NO_SIGNAL: &str = "nosignal";

/// The value carried by one signal.
///
/// Serializes as a JSON integer, or as the string `"nosignal"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalValue {
    Number(i64),
    NoSignal,
}

impl SignalValue {
    /// Parse a request body.
    ///
    /// Surrounding ASCII whitespace is ignored. The integer parse is tried
    /// first; only its failure falls through to the sentinel comparison.
    pub fn parse(body: &str) -> Result<Self, DispatchError> {
        let body = body.trim_ascii();
        if let Ok(n) = body.parse::<i64>() {
            return Ok(Self::Number(n));
        }
        if body == NO_SIGNAL {
            return Ok(Self::NoSignal);
        }
        Err(DispatchError::UnknownSignalValue)
    }

    /// Parse a raw request body. Non-UTF-8 bodies are unknown values.
    pub fn from_body(body: &[u8]) -> Result<Self, DispatchError> {
        let text = std::str::from_utf8(body).map_err(|_| DispatchError::UnknownSignalValue)?;
        Self::parse(text)
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::NoSignal => None,
        }
    }

    pub fn is_no_signal(&self) -> bool {
        matches!(self, Self::NoSignal)
    }
}

impl fmt::Display for SignalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::NoSignal => f.write_str(NO_SIGNAL),
        }
    }
}

impl Serialize for SignalValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(n) => serializer.serialize_i64(*n),
            Self::NoSignal => serializer.serialize_str(NO_SIGNAL),
        }
    }
}

impl<'de> Deserialize<'de> for SignalValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Number(i64),
            Text(String),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Number(n) => Ok(Self::Number(n)),
            Wire::Text(s) if s == NO_SIGNAL => Ok(Self::NoSignal),
            Wire::Text(s) => Err(serde::de::Error::custom(format!(
                "expected an integer or \"{NO_SIGNAL}\", got {s:?}"
            ))),
        }
    }
}

/// The `(keyboard, signal)` pair addressed by a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalPath {
    pub keyboard: String,
    pub signal: String,
}

impl SignalPath {
    /// Split `/<keyboard>/<signal>` at the first `/` after the leading one.
    ///
    /// The signal part keeps any further slashes and is forwarded as sent.
    /// The keyboard part is percent-decoded, so `/my%20kbd/volume` reaches
    /// the keyboard registered as `my kbd`. A path without a second segment,
    /// with an empty keyboard or signal, or whose keyboard does not decode to
    /// UTF-8, is malformed.
    pub fn parse(path: &str) -> Result<Self, DispatchError> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let (keyboard, signal) = path.split_once('/').ok_or(DispatchError::MalformedPath)?;
        if keyboard.is_empty() || signal.is_empty() {
            return Err(DispatchError::MalformedPath);
        }
        let keyboard = percent_decode_str(keyboard)
            .decode_utf8()
            .map_err(|_| DispatchError::MalformedPath)?;
        Ok(Self {
            keyboard: keyboard.into_owned(),
            signal: signal.to_owned(),
        })
    }
}
