//! Sync-link codec.
//!
//! A sync link is the listen-along invite secret carried in presence
//! updates and handed back to us by the OS when a viewer accepts:
//! `nowcast://sync?track=<encoded>&artist=<encoded>`. Links are capped
//! so they always fit the remote protocol's 128-byte secret field.

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use url::Url;

use crate::types::NowcastError;

pub const SYNC_SCHEME: &str = "nowcast";

const MAX_TITLE_CHARS: usize = 50;
const MAX_ARTIST_CHARS: usize = 30;
const MAX_LINK_CHARS: usize = 128;

/// Track identity decoded from an inbound sync link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncLink {
    pub track: String,
    pub artist: Option<String>,
}

/// Encode a track identity as a sync link. Title and artist are
/// truncated on char boundaries before encoding, and the whole link is
/// capped at [`MAX_LINK_CHARS`].
pub fn format_sync_link(title: &str, artist: &str) -> String {
    let title: String = title.trim().chars().take(MAX_TITLE_CHARS).collect();
    let artist: String = artist.trim().chars().take(MAX_ARTIST_CHARS).collect();
    let link = format!(
        "{SYNC_SCHEME}://sync?track={}&artist={}",
        utf8_percent_encode(&title, NON_ALPHANUMERIC),
        utf8_percent_encode(&artist, NON_ALPHANUMERIC),
    );
    truncate_chars(link, MAX_LINK_CHARS)
}

/// Decode an inbound sync link. Foreign schemes and links without a
/// track are rejected; a missing or empty artist is tolerated.
pub fn parse_sync_link(uri: &str) -> Result<SyncLink, NowcastError> {
    let url =
        Url::parse(uri.trim()).map_err(|e| NowcastError::InvalidLink(format!("{uri}: {e}")))?;
    if url.scheme() != SYNC_SCHEME {
        return Err(NowcastError::InvalidLink(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }

    let mut track = None;
    let mut artist = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "track" if !value.is_empty() => track = Some(value.into_owned()),
            "artist" if !value.is_empty() => artist = Some(value.into_owned()),
            _ => {}
        }
    }

    match track {
        Some(track) => Ok(SyncLink { track, artist }),
        None => Err(NowcastError::InvalidLink(
            "missing track parameter".to_string(),
        )),
    }
}

fn truncate_chars(s: String, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s,
    }
}

// ─── Tests ────────────────────────────────────────────────────────
