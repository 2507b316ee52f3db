//! Error types for the Spotify source.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("spotify token refresh failed: {0}")]
    Auth(String),

    /// HTTP 404 from the playback endpoint: nothing to play on.
    #[error("no active spotify device")]
    NoActiveDevice,

    /// HTTP 403 from the playback endpoint.
    #[error("spotify premium required for remote playback")]
    PremiumRequired,

    /// HTTP 502/503, worth retrying later.
    #[error("spotify server error: HTTP {0}")]
    Server(u16),

    #[error("spotify api error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("no spotify match for {track:?}")]
    NoMatch { track: String },

    #[error("spotify http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid match pattern: {0}")]
    Regex(#[from] regex::Error),
}
