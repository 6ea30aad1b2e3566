//! KeyboardRegistry — maps keyboard identifiers to live connections.

use std::collections::HashMap;

use keyrelay_protocol::KeyboardId;
use keyrelay_transport::ConnectionHandle;
use parking_lot::RwLock;
use uuid::Uuid;

/// Identifier → connection map shared by the connection tasks (writers) and
/// the dispatcher (reader).
///
/// At most one connection per identifier; registering again replaces the
/// previous association. One connection may sit under several identifiers if
/// it re-registered under a new name.
///
/// Uses parking_lot::RwLock (sync) so every operation is a single short
/// critical section callable from any task without awaiting.
#[derive(Default)]
pub struct KeyboardRegistry {
    keyboards: RwLock<HashMap<KeyboardId, ConnectionHandle>>,
}

impl KeyboardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `keyboard` with `handle`. Returns the handle it replaced.
    ///
    /// The replaced connection is left open; it just stops receiving signals
    /// addressed to this identifier.
    pub fn register(&self, keyboard: KeyboardId, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.keyboards.write().insert(keyboard, handle)
    }

    /// The connection currently registered under `keyboard`.
    pub fn lookup(&self, keyboard: &str) -> Option<ConnectionHandle> {
        self.keyboards.read().get(keyboard).cloned()
    }

    pub fn remove(&self, keyboard: &str) -> Option<ConnectionHandle> {
        self.keyboards.write().remove(keyboard)
    }

    /// Remove `keyboard` only while it still points at `connection_id`.
    ///
    /// A registration that raced in from another connection is kept.
    pub fn remove_if_current(&self, keyboard: &str, connection_id: Uuid) -> bool {
        let mut keyboards = self.keyboards.write();
        match keyboards.get(keyboard) {
            Some(handle) if handle.id() == connection_id => {
                keyboards.remove(keyboard);
                true
            }
            _ => false,
        }
    }

    /// Drop every identifier pointing at `connection_id`. Returns how many.
    pub fn remove_connection(&self, connection_id: Uuid) -> usize {
        let mut keyboards = self.keyboards.write();
        let before = keyboards.len();
        keyboards.retain(|_, handle| handle.id() != connection_id);
        before - keyboards.len()
    }

    pub fn len(&self) -> usize {
        self.keyboards.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyboards.read().is_empty()
    }

    /// Registered identifiers, sorted.
    pub fn keyboards(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .keyboards
            .read()
            .keys()
            .map(|id| id.as_str().to_owned())
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> KeyboardId {
        KeyboardId::parse(raw).unwrap()
    }

    #[test]
    fn lookup_unknown_is_none() {
        let registry = KeyboardRegistry::new();
        assert!(registry.lookup("kbd1").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn register_then_lookup() {
        let registry = KeyboardRegistry::new();
        let (handle, _rx) = ConnectionHandle::channel(4);

        assert!(registry.register(id("kbd1"), handle.clone()).is_none());
        assert_eq!(registry.lookup("kbd1").unwrap().id(), handle.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn last_registration_wins() {
        let registry = KeyboardRegistry::new();
        let (first, _rx1) = ConnectionHandle::channel(4);
        let (second, _rx2) = ConnectionHandle::channel(4);

        registry.register(id("X"), first.clone());
        let replaced = registry.register(id("X"), second.clone()).unwrap();

        assert_eq!(replaced.id(), first.id());
        assert_eq!(registry.lookup("X").unwrap().id(), second.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_if_current_keeps_newer_registration() {
        let registry = KeyboardRegistry::new();
        let (old, _rx1) = ConnectionHandle::channel(4);
        let (new, _rx2) = ConnectionHandle::channel(4);

        registry.register(id("X"), old.clone());
        registry.register(id("X"), new.clone());

        assert!(!registry.remove_if_current("X", old.id()));
        assert_eq!(registry.lookup("X").unwrap().id(), new.id());

        assert!(registry.remove_if_current("X", new.id()));
        assert!(registry.lookup("X").is_none());
    }

    #[test]
    fn remove_connection_drops_all_its_identifiers() {
        let registry = KeyboardRegistry::new();
        let (conn, _rx1) = ConnectionHandle::channel(4);
        let (other, _rx2) = ConnectionHandle::channel(4);

        registry.register(id("a"), conn.clone());
        registry.register(id("b"), conn.clone());
        registry.register(id("c"), other.clone());

        assert_eq!(registry.remove_connection(conn.id()), 2);
        assert_eq!(registry.keyboards(), vec!["c".to_string()]);
        assert_eq!(registry.remove_connection(conn.id()), 0);
    }

    #[test]
    fn remove_is_unconditional() {
        let registry = KeyboardRegistry::new();
        let (conn, _rx) = ConnectionHandle::channel(4);
        registry.register(id("a"), conn);

        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
    }

    #[test]
    fn concurrent_registrations_stay_consistent() {
        let registry = std::sync::Arc::new(KeyboardRegistry::new());
        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let (handle, _rx) = ConnectionHandle::channel(1);
                        registry.register(id(&format!("kbd{}", i % 10)), handle);
                        let _ = registry.lookup(&format!("kbd{}", (i + t) % 10));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(registry.len(), 10);
    }
}
