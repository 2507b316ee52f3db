//! TrackSource implementation over the Web API client.

use std::sync::Arc;

use nowcast_core::{ProbeError, SourceId, TrackSnapshot, TrackSource};

use crate::client::SpotifyClient;
use crate::models::CurrentlyPlaying;

/// The client is shared: the host loop probes through this source
/// while listen-along resolution drives the same client directly.
pub struct SpotifySource {
    client: Arc<SpotifyClient>,
}

impl SpotifySource {
    pub fn new(client: Arc<SpotifyClient>) -> Self {
        Self { client }
    }
}

impl TrackSource for SpotifySource {
    fn id(&self) -> SourceId {
        SourceId::Spotify
    }

    fn probe(&self) -> Result<Option<TrackSnapshot>, ProbeError> {
        let current = match self.client.currently_playing() {
            Ok(Some(current)) => current,
            Ok(None) => return Ok(None),
            Err(e) => return Err(ProbeError::new(SourceId::Spotify, e)),
        };
        let artwork_bytes = current
            .item
            .as_ref()
            .and_then(|item| self.client.fetch_cover(&item.album));
        Ok(build_snapshot(current, artwork_bytes))
    }
}

fn build_snapshot(
    current: CurrentlyPlaying,
    artwork_bytes: Option<Vec<u8>>,
) -> Option<TrackSnapshot> {
    let item = current.item?;
    if item.name.is_empty() {
        return None;
    }
    let artist = item
        .artists
        .first()
        .map(|a| a.name.clone())
        .unwrap_or_default();
    let album = (!item.album.name.is_empty()).then(|| item.album.name.clone());

    Some(TrackSnapshot {
        title: item.name,
        artist,
        album,
        artwork_bytes,
        source: SourceId::Spotify,
        position_ms: current.progress_ms,
        duration_ms: item.duration_ms,
        is_playing: current.is_playing,
    })
}
