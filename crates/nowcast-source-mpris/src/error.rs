//! Error types for the MPRIS source.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MprisError {
    #[error("playerctl command failed: {0}")]
    CommandFailed(String),

    /// No MPRIS player is registered on the session bus. Mapped to
    /// "nothing playing" by the probe, never surfaced as a fault.
    #[error("no media player found")]
    NoPlayer,

    #[error("failed to parse player metadata: {0}")]
    Parse(String),

    #[error("artwork fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("playerctl io error: {0}")]
    Io(#[from] std::io::Error),
}
