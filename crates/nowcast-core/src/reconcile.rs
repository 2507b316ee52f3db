//! Presence reconciliation planning.
//!
//! [`plan`] is a pure function from (published state, pause flag,
//! arbitrated snapshot) to the single remote action this tick needs.
//! Executing the action and mutating [`PublishedState`] afterwards is
//! the host loop's job, so every branch here is unit-testable without
//! a live session.

use crate::link::format_sync_link;
use crate::types::{PublishedState, TrackSnapshot};

/// Fields shorter than this are replaced by placeholders before
/// publishing, matching the remote protocol's minimum string length.
const MIN_FIELD_CHARS: usize = 2;

const UNKNOWN_TITLE: &str = "Unknown";
const UNKNOWN_ARTIST: &str = "Unknown Artist";

// ─── Planning ─────────────────────────────────────────────────────

/// The one remote action a tick may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceAction {
    /// Nothing to do: same track as last published, or already cleared,
    /// or publishing is paused.
    Noop,
    /// Something was published and nothing is playing now.
    Clear,
    /// A new track (per snapshot identity) must be published.
    Publish(TrackSnapshot),
}

/// Decide the remote action for one tick.
///
/// While paused, no remote mutation is ever planned; sources are still
/// polled upstream so their caches and tokens stay warm. A clear is
/// planned only on the transition into "nothing playing", never
/// repeated while nothing keeps playing.
pub fn plan(
    state: &PublishedState,
    paused: bool,
    snapshot: Option<&TrackSnapshot>,
) -> PresenceAction {
    if paused {
        return PresenceAction::Noop;
    }
    match (snapshot, state.last_snapshot.as_ref()) {
        (None, Some(_)) => PresenceAction::Clear,
        (None, None) => PresenceAction::Noop,
        (Some(new), Some(last)) if new.same_track(last) => PresenceAction::Noop,
        (Some(new), _) => PresenceAction::Publish(new.clone()),
    }
}

// ─── Update payload ───────────────────────────────────────────────

/// Fully resolved payload for one presence update. Protocol framing
/// (party decoration, nonces) is layered on by the session crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceUpdate {
    /// First display line: the track title.
    pub details: String,
    /// Second display line: "by {artist}".
    pub state: String,
    /// Large-image reference: uploaded artwork URL, or the static
    /// application asset key when no artwork is available.
    pub large_image: String,
    /// Hover text for the large image: album when known, else title.
    pub large_text: String,
    /// Unix seconds the track started at, derived from playback
    /// position so the remote side renders live progress without
    /// repeated updates.
    pub start_epoch_s: u64,
    /// Listen-along invite secret, when invites are enabled.
    pub join_secret: Option<String>,
}

/// Build the update payload for a snapshot at publish time.
///
/// Short titles and artists are padded to protocol-safe placeholders;
/// the start timestamp is `now - position`, so position changes alone
/// never force a republish.
pub fn build_presence_update(
    snapshot: &TrackSnapshot,
    artwork_url: Option<&str>,
    asset_key: &str,
    invites: bool,
    now_epoch_s: u64,
) -> PresenceUpdate {
    let title = presentable(&snapshot.title, UNKNOWN_TITLE);
    let artist = presentable(&snapshot.artist, UNKNOWN_ARTIST);
    let large_text = snapshot
        .album
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .unwrap_or(&title)
        .to_string();
    let position_s = snapshot.position_ms.unwrap_or(0) / 1000;

    PresenceUpdate {
        details: title,
        state: format!("by {artist}"),
        large_image: artwork_url.unwrap_or(asset_key).to_string(),
        large_text,
        start_epoch_s: now_epoch_s.saturating_sub(position_s),
        join_secret: invites.then(|| format_sync_link(&snapshot.title, &snapshot.artist)),
    }
}

fn presentable(raw: &str, fallback: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() >= MIN_FIELD_CHARS {
        trimmed.to_string()
    } else {
        fallback.to_string()
    }
}

// ─── Tests ────────────────────────────────────────────────────────
