//! Pure payload builders for the IPC protocol.
//!
//! Shapes every JSON body the session and the join listener send, so
//! the wire format is testable without a socket.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Value, json};

use nowcast_core::PresenceUpdate;

/// Party identifier shown on the published activity. One session per
/// process, so a fixed id is enough.
pub const PARTY_ID: &str = "nowcast-session-1";

static NONCE: AtomicU64 = AtomicU64::new(1);

/// Process-unique nonce for request/response correlation.
pub fn next_nonce() -> String {
    NONCE.fetch_add(1, Ordering::Relaxed).to_string()
}

/// Opcode-0 handshake body.
pub fn handshake_payload(client_id: &str) -> Value {
    json!({ "v": 1, "client_id": client_id })
}

/// `SET_ACTIVITY` command. `None` clears the published activity.
pub fn set_activity_payload(pid: u32, activity: Option<Value>) -> Value {
    json!({
        "cmd": "SET_ACTIVITY",
        "args": { "pid": pid, "activity": activity },
        "nonce": next_nonce(),
    })
}

/// `SUBSCRIBE` command for one event name.
pub fn subscribe_payload(event: &str) -> Value {
    json!({ "cmd": "SUBSCRIBE", "evt": event, "nonce": next_nonce() })
}

/// Auto-accept reply to an `ACTIVITY_JOIN_REQUEST`.
pub fn join_invite_payload(user_id: &str) -> Value {
    json!({
        "cmd": "SEND_ACTIVITY_JOIN_INVITE",
        "args": { "user_id": user_id },
        "nonce": next_nonce(),
    })
}

/// Shape a [`PresenceUpdate`] into the activity object `SET_ACTIVITY`
/// expects. Fields without a value are omitted, never sent as null.
pub fn activity_json(update: &PresenceUpdate) -> Value {
    let mut activity = json!({
        "details": update.details,
        "state": update.state,
        "timestamps": { "start": update.start_epoch_s },
        "assets": {
            "large_image": update.large_image,
            "large_text": update.large_text,
        },
    });
    if let Some(ref secret) = update.join_secret {
        activity["party"] = json!({ "id": PARTY_ID, "size": [1, 2] });
        activity["secrets"] = json!({ "join": secret });
    }
    activity
}
