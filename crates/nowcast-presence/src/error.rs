//! Presence session error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("presence session is not connected")]
    NotConnected,

    #[error("no presence IPC socket found")]
    SocketNotFound,

    #[error("handshake rejected: {0}")]
    Handshake(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PresenceError {
    /// Faults that leave the underlying transport in an unknown state.
    /// The session drops its socket when one of these surfaces so
    /// `is_connected` reflects reality.
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            PresenceError::Io(_) | PresenceError::Json(_) | PresenceError::Protocol(_)
        )
    }
}
