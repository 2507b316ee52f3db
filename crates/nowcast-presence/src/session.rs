//! PresenceClient trait and the Discord IPC command session.
//!
//! The command session is send-only in protocol terms: it writes one
//! command and reads exactly one reply, so replies can never interleave
//! with subscription events. Event delivery lives on its own
//! connection in [`crate::events`].

use std::io::Write;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use nowcast_core::PresenceUpdate;

use crate::activity;
use crate::error::PresenceError;
use crate::ipc;

/// Read/write deadline for one command round trip.
const IPC_TIMEOUT: Duration = Duration::from_secs(5);

/// Remote presence session. Implementations keep connection state
/// behind `&self`; retry policy belongs to the caller, never here.
pub trait PresenceClient: Send + Sync {
    fn connect(&self) -> Result<(), PresenceError>;
    fn update(&self, update: &PresenceUpdate) -> Result<(), PresenceError>;
    fn clear(&self) -> Result<(), PresenceError>;
    fn disconnect(&self);
    fn is_connected(&self) -> bool;
}

impl<T: PresenceClient + ?Sized> PresenceClient for &T {
    fn connect(&self) -> Result<(), PresenceError> {
        (**self).connect()
    }
    fn update(&self, update: &PresenceUpdate) -> Result<(), PresenceError> {
        (**self).update(update)
    }
    fn clear(&self) -> Result<(), PresenceError> {
        (**self).clear()
    }
    fn disconnect(&self) {
        (**self).disconnect()
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

impl<T: PresenceClient + ?Sized> PresenceClient for Arc<T> {
    fn connect(&self) -> Result<(), PresenceError> {
        (**self).connect()
    }
    fn update(&self, update: &PresenceUpdate) -> Result<(), PresenceError> {
        (**self).update(update)
    }
    fn clear(&self) -> Result<(), PresenceError> {
        (**self).clear()
    }
    fn disconnect(&self) {
        (**self).disconnect()
    }
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

/// Discord Rich Presence over the local IPC socket.
pub struct DiscordPresence {
    client_id: String,
    socket_path: Option<PathBuf>,
    conn: Mutex<Option<UnixStream>>,
}

impl DiscordPresence {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            socket_path: None,
            conn: Mutex::new(None),
        }
    }

    /// Connect to a fixed socket path instead of discovering one.
    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    /// Write one command and return its reply. Any transport fault
    /// drops the connection; an `evt: ERROR` reply keeps it, since the
    /// stream is still framed correctly.
    fn send_command(&self, payload: &Value) -> Result<Value, PresenceError> {
        let mut guard = self.conn.lock();
        let stream = guard.as_mut().ok_or(PresenceError::NotConnected)?;
        let reply = match exchange(stream, payload) {
            Ok(reply) => reply,
            Err(e) => {
                *guard = None;
                return Err(e);
            }
        };
        if reply.get("evt").and_then(Value::as_str) == Some("ERROR") {
            let code = reply
                .pointer("/data/code")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            return Err(PresenceError::Rpc {
                code,
                message: data_message(&reply),
            });
        }
        Ok(reply)
    }
}

impl PresenceClient for DiscordPresence {
    fn connect(&self) -> Result<(), PresenceError> {
        let mut stream = ipc::open_socket(self.socket_path.as_deref())?;
        stream.set_read_timeout(Some(IPC_TIMEOUT))?;
        stream.set_write_timeout(Some(IPC_TIMEOUT))?;
        let hello = activity::handshake_payload(&self.client_id);
        stream.write_all(&ipc::encode_frame(ipc::OP_HANDSHAKE, &hello))?;
        let (_, reply) = ipc::read_frame(&mut stream)?;
        check_ready(&reply)?;
        *self.conn.lock() = Some(stream);
        Ok(())
    }

    fn update(&self, update: &PresenceUpdate) -> Result<(), PresenceError> {
        let activity = activity::activity_json(update);
        let payload = activity::set_activity_payload(std::process::id(), Some(activity));
        self.send_command(&payload).map(|_| ())
    }

    fn clear(&self) -> Result<(), PresenceError> {
        let payload = activity::set_activity_payload(std::process::id(), None);
        self.send_command(&payload).map(|_| ())
    }

    fn disconnect(&self) {
        let mut guard = self.conn.lock();
        if let Some(mut stream) = guard.take() {
            // Best-effort close opcode; the drop below ends the session
            // either way.
            let _ = stream.write_all(&ipc::encode_frame(ipc::OP_CLOSE, &json!({})));
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }
}

fn exchange(stream: &mut UnixStream, payload: &Value) -> Result<Value, PresenceError> {
    stream.write_all(&ipc::encode_frame(ipc::OP_FRAME, payload))?;
    let (_, reply) = ipc::read_frame(stream)?;
    Ok(reply)
}

fn check_ready(reply: &Value) -> Result<(), PresenceError> {
    match reply.get("evt").and_then(Value::as_str) {
        Some("READY") => Ok(()),
        Some("ERROR") => Err(PresenceError::Handshake(data_message(reply))),
        evt => Err(PresenceError::Handshake(format!(
            "expected READY, got {}",
            evt.unwrap_or("a frame without evt")
        ))),
    }
}

fn data_message(reply: &Value) -> String {
    reply
        .pointer("/data/message")
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string()
}

// ─── Tests ────────────────────────────────────────────────────────
