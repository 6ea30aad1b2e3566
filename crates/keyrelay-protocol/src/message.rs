//! The message pushed to a registered keyboard.

use serde::{Deserialize, Serialize};

use crate::signal::SignalValue;

/// `{"signal": "<name>", "value": <int | "nosignal">}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayMessage {
    pub signal: String,
    pub value: SignalValue,
}

impl RelayMessage {
    pub fn new(signal: impl Into<String>, value: SignalValue) -> Self {
        Self {
            signal: signal.into(),
            value,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
