use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Source identity ──────────────────────────────────────────────

/// Identity of a track source. `Mpris` is the local media-session
/// adapter, `Spotify` the streaming-service adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum SourceId {
    Mpris,
    Spotify,
}

impl SourceId {
    /// Fixed arbitration priority: local player first, web API second.
    pub const PRIORITY: [Self; 2] = [Self::Mpris, Self::Spotify];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mpris => "mpris",
            Self::Spotify => "spotify",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceId {
    type Err = NowcastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mpris" => Ok(Self::Mpris),
            "spotify" => Ok(Self::Spotify),
            _ => Err(NowcastError::UnknownSource(s.to_string())),
        }
    }
}

// ─── Track snapshot ───────────────────────────────────────────────

/// A point-in-time read of "what is playing right now" from one source.
/// Produced fresh on every poll and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    /// Raw cover-art bytes, when the source could produce them.
    pub artwork_bytes: Option<Vec<u8>>,
    pub source: SourceId,
    pub position_ms: Option<u64>,
    pub duration_ms: Option<u64>,
    pub is_playing: bool,
}

impl TrackSnapshot {
    /// Reconciliation identity: `(title, artist, source)`. Position,
    /// duration, and artwork changes alone never trigger a republish.
    pub fn same_track(&self, other: &Self) -> bool {
        self.title == other.title && self.artist == other.artist && self.source == other.source
    }
}

// ─── Published state ──────────────────────────────────────────────

/// What the remote side currently shows, as far as this process knows.
/// Owned by the host loop and passed explicitly into every
/// reconciliation step; mutated only after a confirmed remote call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishedState {
    pub last_snapshot: Option<TrackSnapshot>,
    pub artwork_url: Option<String>,
    pub artwork_cache_key: Option<String>,
    pub connected: bool,
}

impl PublishedState {
    pub fn phase(&self, paused: bool) -> PresencePhase {
        if paused {
            PresencePhase::Paused
        } else if self.last_snapshot.is_some() {
            PresencePhase::Active
        } else {
            PresencePhase::Idle
        }
    }
}

/// User-visible lifecycle phase, derived from published state + the
/// pause flag. `Paused` means adapters keep polling but no remote
/// mutation happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresencePhase {
    Idle,
    Active,
    Paused,
}

impl PresencePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for PresencePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NowcastError {
    UnknownSource(String),
    InvalidLink(String),
    InvalidConfig(String),
}

impl fmt::Display for NowcastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSource(s) => write!(f, "unknown source: {s}"),
            Self::InvalidLink(msg) => write!(f, "invalid sync link: {msg}"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for NowcastError {}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(title: &str, artist: &str, source: SourceId) -> TrackSnapshot {
        TrackSnapshot {
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            artwork_bytes: None,
            source,
            position_ms: None,
            duration_ms: None,
            is_playing: true,
        }
    }

    #[test]
    fn source_id_roundtrip() {
        for id in SourceId::PRIORITY {
            let parsed: SourceId = id.as_str().parse().expect("roundtrip");
            assert_eq!(parsed, id);
        }
    }

    #[test]
    fn source_id_from_str_case_insensitive() {
        assert_eq!("MPRIS".parse::<SourceId>().expect("parse"), SourceId::Mpris);
        assert_eq!(
            "Spotify".parse::<SourceId>().expect("parse"),
            SourceId::Spotify
        );
    }

    #[test]
    fn source_id_unknown_rejected() {
        let err = "itunes".parse::<SourceId>().unwrap_err();
        assert_eq!(err, NowcastError::UnknownSource("itunes".to_string()));
    }

    #[test]
    fn priority_order_is_mpris_first() {
        assert_eq!(SourceId::PRIORITY, [SourceId::Mpris, SourceId::Spotify]);
    }

    #[test]
    fn same_track_ignores_position_and_artwork() {
        let a = snap("Song A", "Artist X", SourceId::Mpris);
        let mut b = a.clone();
        b.position_ms = Some(42_000);
        b.duration_ms = Some(180_000);
        b.artwork_bytes = Some(vec![1, 2, 3]);
        assert!(a.same_track(&b));
        assert_ne!(a, b, "full equality still sees the difference");
    }

    #[test]
    fn same_track_distinguishes_source() {
        let a = snap("Song A", "Artist X", SourceId::Mpris);
        let b = snap("Song A", "Artist X", SourceId::Spotify);
        assert!(!a.same_track(&b));
    }

    #[test]
    fn same_track_distinguishes_title_and_artist() {
        let a = snap("Song A", "Artist X", SourceId::Mpris);
        assert!(!a.same_track(&snap("Song B", "Artist X", SourceId::Mpris)));
        assert!(!a.same_track(&snap("Song A", "Artist Y", SourceId::Mpris)));
    }

    #[test]
    fn published_state_starts_empty_and_idle() {
        let state = PublishedState::default();
        assert!(state.last_snapshot.is_none());
        assert!(state.artwork_url.is_none());
        assert!(!state.connected);
        assert_eq!(state.phase(false), PresencePhase::Idle);
    }

    #[test]
    fn phase_derivation() {
        let mut state = PublishedState::default();
        assert_eq!(state.phase(true), PresencePhase::Paused);
        state.last_snapshot = Some(snap("Song A", "Artist X", SourceId::Mpris));
        assert_eq!(state.phase(false), PresencePhase::Active);
        assert_eq!(state.phase(true), PresencePhase::Paused);
    }

    #[test]
    fn source_id_serde_lowercase() {
        let json = serde_json::to_string(&SourceId::Mpris).expect("serialize");
        assert_eq!(json, "\"mpris\"");
        let back: SourceId = serde_json::from_str("\"spotify\"").expect("deserialize");
        assert_eq!(back, SourceId::Spotify);
    }
}
