//! Join-event listener.
//!
//! The command session never reads unsolicited frames, so join events
//! need their own IPC connection. [`JoinListener`] subscribes to the
//! two join events, hands received secrets to a callback, and
//! auto-accepts incoming join requests. The owner runs [`JoinListener::run`]
//! on a blocking thread; it reconnects with a fixed delay until
//! [`JoinListener::stop`] is called.

use std::io::{ErrorKind, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde_json::Value;

use crate::activity;
use crate::error::PresenceError;
use crate::ipc;

pub const EVENT_JOIN: &str = "ACTIVITY_JOIN";
pub const EVENT_JOIN_REQUEST: &str = "ACTIVITY_JOIN_REQUEST";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout inside the event loop; each expiry is a stop-flag
/// check, so this bounds shutdown latency.
const EVENT_READ_TIMEOUT: Duration = Duration::from_secs(2);
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct JoinListener {
    client_id: String,
    socket_path: Option<PathBuf>,
    reconnect_delay: Duration,
    stop: Mutex<bool>,
    stop_cv: Condvar,
}

impl JoinListener {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            socket_path: None,
            reconnect_delay: RECONNECT_DELAY,
            stop: Mutex::new(false),
            stop_cv: Condvar::new(),
        }
    }

    /// Connect to a fixed socket path instead of discovering one.
    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Ask a running listener to exit. Takes effect within one event
    /// read timeout or reconnect delay.
    pub fn stop(&self) {
        let mut stopped = self.stop.lock();
        *stopped = true;
        self.stop_cv.notify_all();
    }

    fn stopped(&self) -> bool {
        *self.stop.lock()
    }

    /// Wait up to `timeout` for a stop request; returns the stop flag.
    fn wait_stop(&self, timeout: Duration) -> bool {
        let mut stopped = self.stop.lock();
        if !*stopped {
            self.stop_cv.wait_for(&mut stopped, timeout);
        }
        *stopped
    }

    /// Listen until stopped, reconnecting after session faults. Each
    /// received join secret is passed to `on_join`.
    pub fn run<F: Fn(String)>(&self, on_join: F) {
        while !self.stopped() {
            if let Err(e) = self.session(&on_join) {
                tracing::debug!("join listener session ended: {e}");
            }
            if self.wait_stop(self.reconnect_delay) {
                break;
            }
        }
        tracing::debug!("join listener stopped");
    }

    fn session<F: Fn(String)>(&self, on_join: &F) -> Result<(), PresenceError> {
        let mut stream = ipc::open_socket(self.socket_path.as_deref())?;
        stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
        stream.set_write_timeout(Some(HANDSHAKE_TIMEOUT))?;

        let hello = activity::handshake_payload(&self.client_id);
        stream.write_all(&ipc::encode_frame(ipc::OP_HANDSHAKE, &hello))?;
        let (_, reply) = ipc::read_frame(&mut stream)?;
        if reply.get("evt").and_then(Value::as_str) != Some("READY") {
            return Err(PresenceError::Handshake(
                "listener handshake not acknowledged".to_string(),
            ));
        }

        for event in [EVENT_JOIN, EVENT_JOIN_REQUEST] {
            let subscribe = activity::subscribe_payload(event);
            stream.write_all(&ipc::encode_frame(ipc::OP_FRAME, &subscribe))?;
            ipc::read_frame(&mut stream)?;
        }
        tracing::debug!("join listener subscribed");

        stream.set_read_timeout(Some(EVENT_READ_TIMEOUT))?;
        self.event_loop(&mut stream, on_join)
    }

    fn event_loop<F: Fn(String)>(
        &self,
        stream: &mut UnixStream,
        on_join: &F,
    ) -> Result<(), PresenceError> {
        while !self.stopped() {
            let frame = match ipc::read_frame(stream) {
                Ok((_, value)) => value,
                // Timeout with no pending frame; check the stop flag.
                Err(PresenceError::Io(e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(e) => return Err(e),
            };

            match frame.get("evt").and_then(Value::as_str) {
                Some(EVENT_JOIN) => {
                    let secret = frame
                        .pointer("/data/secret")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    if !secret.is_empty() {
                        tracing::info!("join event received: {secret}");
                        on_join(secret.to_string());
                    }
                }
                Some(EVENT_JOIN_REQUEST) => {
                    let user_id = frame
                        .pointer("/data/user/id")
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    if !user_id.is_empty() {
                        tracing::info!("auto-accepting join request from user {user_id}");
                        let invite = activity::join_invite_payload(user_id);
                        stream.write_all(&ipc::encode_frame(ipc::OP_FRAME, &invite))?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────
