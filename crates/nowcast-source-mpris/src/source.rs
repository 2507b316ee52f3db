//! TrackSource implementation over the playerctl runner.

use nowcast_core::{ProbeError, SourceId, TrackSnapshot, TrackSource};

use crate::art::ArtFetcher;
use crate::metadata::fetch_metadata;
use crate::runner::{PlayerCommandRunner, PlayerctlExecutor};

pub struct MprisSource<R: PlayerCommandRunner> {
    runner: R,
    art: ArtFetcher,
}

impl Default for MprisSource<PlayerctlExecutor> {
    fn default() -> Self {
        Self::new(PlayerctlExecutor::default())
    }
}

impl<R: PlayerCommandRunner> MprisSource<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            art: ArtFetcher::new(),
        }
    }
}

impl<R: PlayerCommandRunner> TrackSource for MprisSource<R> {
    fn id(&self) -> SourceId {
        SourceId::Mpris
    }

    fn probe(&self) -> Result<Option<TrackSnapshot>, ProbeError> {
        let meta = match fetch_metadata(&self.runner) {
            Ok(Some(meta)) => meta,
            Ok(None) => return Ok(None),
            Err(e) => return Err(ProbeError::new(SourceId::Mpris, e)),
        };
        if meta.title.is_empty() && meta.artist.is_empty() {
            return Ok(None);
        }

        // A track without artwork is still a track; art faults are
        // retried on the next poll via the per-URL memo.
        let artwork_bytes = meta
            .art_url
            .as_deref()
            .and_then(|u| self.art.fetch(u).ok())
            .flatten();
        let is_playing = meta.is_playing();

        Ok(Some(TrackSnapshot {
            title: meta.title,
            artist: meta.artist,
            album: meta.album,
            artwork_bytes,
            source: SourceId::Mpris,
            position_ms: meta.position_ms,
            duration_ms: meta.duration_ms,
            is_playing,
        }))
    }
}
