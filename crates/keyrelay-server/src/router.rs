//! Relay Server — connects transport events to the registry and dispatcher.

use std::sync::Arc;

use keyrelay_protocol::{DispatchError, KeyboardId};
use keyrelay_transport::{ConnectionHandle, RelayHandler};
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatch::RelayDispatcher;
use crate::registry::KeyboardRegistry;

/// The relay server — owns the dispatcher and shares the registry with it.
pub struct RelayServer {
    registry: Arc<KeyboardRegistry>,
    dispatcher: RelayDispatcher,
}

impl RelayServer {
    pub fn new(registry: Arc<KeyboardRegistry>) -> Self {
        let dispatcher = RelayDispatcher::new(registry.clone());
        Self {
            registry,
            dispatcher,
        }
    }

    pub fn registry(&self) -> &Arc<KeyboardRegistry> {
        &self.registry
    }
}

impl RelayHandler for RelayServer {
    fn register(&self, keyboard: KeyboardId, handle: ConnectionHandle) {
        let connection_id = handle.id();
        match self.registry.register(keyboard.clone(), handle) {
            Some(previous) if previous.id() != connection_id => {
                info!("Keyboard {keyboard} moved to connection {connection_id} (was {})", previous.id());
            }
            Some(_) => debug!("Keyboard {keyboard} re-registered by {connection_id}"),
            None => info!("Keyboard {keyboard} registered by {connection_id}"),
        }
    }

    fn disconnect(&self, connection_id: Uuid) {
        let removed = self.registry.remove_connection(connection_id);
        if removed > 0 {
            info!(
                "Connection {connection_id} gone, {removed} keyboard(s) unregistered ({} remaining)",
                self.registry.len()
            );
        }
    }

    fn dispatch(&self, path: &str, body: &[u8]) -> Result<(), DispatchError> {
        self.dispatcher.dispatch(path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disconnect_unregisters_connection() {
        let server = RelayServer::new(Arc::new(KeyboardRegistry::new()));
        let (handle, _rx) = ConnectionHandle::channel(4);
        let (other, _other_rx) = ConnectionHandle::channel(4);

        server.register(KeyboardId::parse("kbd1").unwrap(), handle.clone());
        server.register(KeyboardId::parse("kbd1-renamed").unwrap(), handle.clone());
        server.register(KeyboardId::parse("kbd2").unwrap(), other);

        server.disconnect(handle.id());

        assert_eq!(server.registry().keyboards(), vec!["kbd2".to_string()]);
        assert_eq!(
            server.dispatch("/kbd1/volume", b"1"),
            Err(DispatchError::KeyboardNotFound)
        );
    }

    #[test]
    fn shares_registry_with_dispatcher() {
        let registry = Arc::new(KeyboardRegistry::new());
        let server = RelayServer::new(registry.clone());
        let (handle, mut rx) = ConnectionHandle::channel(4);

        server.register(KeyboardId::parse("kbd1").unwrap(), handle);
        assert!(registry.lookup("kbd1").is_some());

        server.dispatch("/kbd1/volume", b"42").unwrap();
        assert_eq!(rx.try_recv().unwrap(), r#"{"signal":"volume","value":42}"#);
    }
}
