//! Wire models for the handful of Web API endpoints this crate uses.
//! Every field the API might omit defaults, so a sparse payload never
//! fails the whole probe.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentlyPlaying {
    pub item: Option<TrackItem>,
    #[serde(default)]
    pub progress_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub is_playing: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackItem {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub artists: Vec<ArtistRef>,
    #[serde(default)]
    pub album: AlbumRef,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArtistRef {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AlbumRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageRef {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub tracks: TrackPage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackPage {
    #[serde(default)]
    pub items: Vec<TrackItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_true() -> bool {
    true
}

fn default_expires_in() -> u64 {
    3600
}
