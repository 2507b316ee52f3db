//! nowcast-core: Pure domain logic for the now-playing presence bridge.
//! Track model, source arbitration, presence reconciliation planning,
//! sync-link codec, and configuration. No async, no IO.

pub mod config;
pub mod link;
pub mod reconcile;
pub mod source;
pub mod types;

pub use config::Config;
pub use link::{SyncLink, format_sync_link, parse_sync_link};
pub use reconcile::{PresenceAction, PresenceUpdate, build_presence_update, plan};
pub use source::{ArbitrationOutcome, ProbeError, TrackSource, arbitrate};
pub use types::{NowcastError, PresencePhase, PublishedState, SourceId, TrackSnapshot};
