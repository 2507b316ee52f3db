//! nowcast-source-spotify: Spotify Web API IO boundary.
//! Now-playing probe, cover download, and the search-then-play path
//! used by listen-along resolution. Auth is a refresh-token grant;
//! the token is provisioned out of band.

pub mod client;
pub mod error;
pub mod matching;
pub mod models;
pub mod source;

pub use client::{LATENCY_OFFSET_MS, SpotifyClient};
pub use error::SpotifyError;
pub use matching::TitleNormalizer;
pub use source::SpotifySource;
