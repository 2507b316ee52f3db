//! Deep-link resolution.
//!
//! `nowcast open <uri>` and accepted join events both land here: play
//! the shared track on the streaming service when an authorized
//! session exists, otherwise open a web search in the browser. One
//! attempt, one fallback, no retry loop.

use std::sync::Arc;

use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use nowcast_core::link::{SyncLink, parse_sync_link};
use nowcast_core::Config;
use nowcast_source_spotify::{SpotifyClient, SpotifyError};

/// Where resolved links can start playback. The host wires the Spotify
/// client in; tests inject scripted targets.
pub trait PlaybackTarget: Send + Sync {
    /// Whether an authorized streaming session is usable right now.
    fn ready(&self) -> bool;
    /// Start playing; returns the matched catalog title.
    fn play(&self, track: &str, artist: &str) -> Result<String, SpotifyError>;
}

pub struct SpotifyTarget(Arc<SpotifyClient>);

impl SpotifyTarget {
    pub fn new(client: Arc<SpotifyClient>) -> Self {
        Self(client)
    }
}

impl PlaybackTarget for SpotifyTarget {
    fn ready(&self) -> bool {
        self.0.authorized()
    }

    fn play(&self, track: &str, artist: &str) -> Result<String, SpotifyError> {
        self.0.search_and_play(track, artist, 0)
    }
}

/// How a link was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Playback started; carries the matched catalog title.
    Playing(String),
    /// Fallback web-search URL for the viewer's browser.
    WebSearch(String),
}

/// Resolve one link: the streaming target when it is configured,
/// authorized, and finds the track; a web search URL for everything
/// else, including playback faults.
pub fn resolve_sync_link(target: Option<&dyn PlaybackTarget>, link: &SyncLink) -> LinkOutcome {
    let artist = link.artist.as_deref().unwrap_or("");
    if let Some(target) = target {
        if target.ready() {
            match target.play(&link.track, artist) {
                Ok(matched) => return LinkOutcome::Playing(matched),
                Err(e) => {
                    tracing::warn!("streaming playback failed, falling back to search: {e}");
                }
            }
        } else {
            tracing::debug!("streaming session not authorized, falling back to search");
        }
    }
    LinkOutcome::WebSearch(search_url(&link.track, artist))
}

/// Web search fallback on the streaming service's public site.
pub fn search_url(track: &str, artist: &str) -> String {
    let query = format!("{} {}", track.trim(), artist.trim());
    format!(
        "https://open.spotify.com/search/{}",
        utf8_percent_encode(query.trim(), NON_ALPHANUMERIC)
    )
}

/// Hand a URL to the desktop's default browser.
pub fn open_in_browser(url: &str) -> anyhow::Result<()> {
    let status = std::process::Command::new("xdg-open")
        .arg(url)
        .status()
        .map_err(|e| anyhow::anyhow!("cannot run xdg-open: {e}"))?;
    if !status.success() {
        anyhow::bail!("xdg-open exited with {status}");
    }
    Ok(())
}

/// Build the playback target when the fallback source is configured.
pub fn build_target(config: &Config) -> anyhow::Result<Option<Arc<dyn PlaybackTarget>>> {
    match &config.spotify {
        Some(spotify_cfg) => {
            let client = SpotifyClient::new(spotify_cfg.clone())?;
            Ok(Some(Arc::new(SpotifyTarget::new(Arc::new(client)))))
        }
        None => Ok(None),
    }
}

/// `nowcast open <uri>`: one resolution attempt, then exit.
pub async fn cmd_open(config: &Config, uri: &str) -> anyhow::Result<()> {
    let link = parse_sync_link(uri)?;
    let target = build_target(config)?;

    let outcome = tokio::task::spawn_blocking(move || -> anyhow::Result<LinkOutcome> {
        let resolved = resolve_sync_link(target.as_deref(), &link);
        if let LinkOutcome::WebSearch(url) = &resolved {
            open_in_browser(url)?;
        }
        Ok(resolved)
    })
    .await??;

    match outcome {
        LinkOutcome::Playing(matched) => println!("playing {matched}"),
        LinkOutcome::WebSearch(url) => println!("opened {url}"),
    }
    Ok(())
}
