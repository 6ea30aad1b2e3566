//! Connection handles for upgraded `/listen` sockets.

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Why a push onto a connection's outbound queue failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    /// The connection task has exited; the socket is gone.
    #[error("connection closed")]
    Closed,
    /// The connection is not draining its queue fast enough.
    #[error("outbound queue full")]
    Full,
}

/// Send capability for one live WebSocket connection.
///
/// Cloning is cheap; every clone feeds the same outbound queue, which the
/// connection task drains into text frames.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::Sender<String>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { id: Uuid::new_v4(), tx }, rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Queue a text message without waiting.
    pub fn push(&self, text: String) -> Result<(), PushError> {
        self.tx.try_send(text).map_err(|e| match e {
            mpsc::error::TrySendError::Closed(_) => PushError::Closed,
            mpsc::error::TrySendError::Full(_) => PushError::Full,
        })
    }
}
