//! RelayDispatcher — turns one signal request into a pushed relay message.

use std::sync::Arc;

use keyrelay_protocol::{DispatchError, RelayMessage, SignalPath, SignalValue};
use keyrelay_transport::PushError;
use tracing::{debug, error, warn};

use crate::registry::KeyboardRegistry;

/// Parses `/<keyboard>/<signal>` requests and relays them to the registered
/// connection.
pub struct RelayDispatcher {
    registry: Arc<KeyboardRegistry>,
}

impl RelayDispatcher {
    pub fn new(registry: Arc<KeyboardRegistry>) -> Self {
        Self { registry }
    }

    /// Dispatch one request.
    ///
    /// Path and body are validated before the registry is consulted. Once a
    /// connection is found the request succeeds; the push itself is best
    /// effort and its failure only shows up in the logs (and evicts a closed
    /// connection from the registry).
    pub fn dispatch(&self, path: &str, body: &[u8]) -> Result<(), DispatchError> {
        let target = SignalPath::parse(path)?;
        let value = SignalValue::from_body(body)?;

        let handle = self
            .registry
            .lookup(&target.keyboard)
            .ok_or(DispatchError::KeyboardNotFound)?;

        let message = RelayMessage::new(target.signal, value);
        let json = match message.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize relay message for {}: {e}", target.keyboard);
                return Ok(());
            }
        };

        match handle.push(json) {
            Ok(()) => {
                debug!("Relayed {}={} to {}", message.signal, message.value, target.keyboard);
            }
            Err(PushError::Closed) => {
                warn!("Keyboard {} is gone, dropping its registration", target.keyboard);
                self.registry.remove_if_current(&target.keyboard, handle.id());
            }
            Err(PushError::Full) => {
                warn!("Keyboard {} is not keeping up, dropped {}", target.keyboard, message.signal);
            }
        }
        Ok(())
    }
}
