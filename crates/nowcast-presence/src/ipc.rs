//! Discord IPC transport: frame codec and socket discovery.
//!
//! Frames are a little-endian `u32` opcode plus a little-endian `u32`
//! body length, followed by a JSON body. Opcode 0 carries the
//! handshake, 1 carries commands and events, 2 closes the session.

use std::io::Read;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::PresenceError;

pub const OP_HANDSHAKE: u32 = 0;
pub const OP_FRAME: u32 = 1;
pub const OP_CLOSE: u32 = 2;

/// Upper bound on an incoming frame body. Real frames are a few
/// hundred bytes; anything near this means the stream is desynced.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Socket subdirectories searched under each base, in order: plain,
/// flatpak, snap.
const SOCKET_SUBDIRS: [&str; 3] = ["", "app/com.discordapp.Discord", "snap.discord"];

/// How many numbered sockets each Discord install may expose.
const SOCKET_SLOTS: u32 = 10;

// ─── Frame codec ──────────────────────────────────────────────────

/// Encode one frame: 8-byte header followed by the JSON body.
pub fn encode_frame(op: u32, payload: &Value) -> Vec<u8> {
    let body = payload.to_string().into_bytes();
    let mut buf = Vec::with_capacity(8 + body.len());
    buf.extend_from_slice(&op.to_le_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&body);
    buf
}

/// Read one frame, returning its opcode and parsed JSON body.
///
/// A read timeout configured on the underlying socket surfaces here as
/// `PresenceError::Io` with `WouldBlock`/`TimedOut`.
pub fn read_frame(reader: &mut impl Read) -> Result<(u32, Value), PresenceError> {
    let mut header = [0u8; 8];
    reader.read_exact(&mut header)?;
    let op = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(PresenceError::Protocol(format!(
            "frame body of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
        )));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body)?;
    let value = serde_json::from_slice(&body)?;
    Ok((op, value))
}

// ─── Socket discovery ─────────────────────────────────────────────

/// Every socket path a Discord install may listen on under the given
/// base directories, in connection-attempt order.
pub fn candidate_paths(bases: &[PathBuf]) -> Vec<PathBuf> {
    let mut paths = Vec::with_capacity(bases.len() * SOCKET_SUBDIRS.len() * SOCKET_SLOTS as usize);
    for base in bases {
        for sub in SOCKET_SUBDIRS {
            let dir = if sub.is_empty() {
                base.clone()
            } else {
                base.join(sub)
            };
            for slot in 0..SOCKET_SLOTS {
                paths.push(dir.join(format!("discord-ipc-{slot}")));
            }
        }
    }
    paths
}

/// Base directories to search, from the usual runtime-dir variables
/// with a `/tmp` fallback.
pub fn default_socket_bases() -> Vec<PathBuf> {
    let mut bases: Vec<PathBuf> = ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
        .iter()
        .filter_map(|var| std::env::var(var).ok())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .collect();
    bases.push(PathBuf::from("/tmp"));
    bases
}

/// Connect to the first reachable IPC socket, or to the override path
/// when one is set (used by tests and non-standard installs).
pub fn open_socket(override_path: Option<&Path>) -> Result<UnixStream, PresenceError> {
    if let Some(path) = override_path {
        return UnixStream::connect(path).map_err(PresenceError::Io);
    }
    for path in candidate_paths(&default_socket_bases()) {
        if let Ok(stream) = UnixStream::connect(&path) {
            return Ok(stream);
        }
    }
    Err(PresenceError::SocketNotFound)
}

// ─── Tests ────────────────────────────────────────────────────────
