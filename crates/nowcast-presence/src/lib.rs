//! nowcast-presence: Discord Rich Presence IO boundary.
//! Speaks the local IPC protocol (frame codec, handshake, SET_ACTIVITY)
//! behind the `PresenceClient` seam, plus a dedicated join-event
//! listener connection. No reconciliation logic.

pub mod activity;
pub mod error;
pub mod events;
pub mod ipc;
pub mod session;

pub use activity::{PARTY_ID, activity_json};
pub use error::PresenceError;
pub use events::{EVENT_JOIN, EVENT_JOIN_REQUEST, JoinListener};
pub use ipc::{OP_CLOSE, OP_FRAME, OP_HANDSHAKE, candidate_paths, encode_frame, read_frame};
pub use session::{DiscordPresence, PresenceClient};
