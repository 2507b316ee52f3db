//! nowcast-source-mpris: local media-session IO boundary.
//! Probes the active MPRIS player through the `playerctl` subprocess and
//! resolves cover art to raw bytes. No reconciliation logic; a pure IO
//! boundary behind the `TrackSource` seam.

pub mod art;
pub mod error;
pub mod metadata;
pub mod runner;
pub mod source;

pub use art::ArtFetcher;
pub use error::MprisError;
pub use metadata::{NOW_PLAYING_FORMAT, PlayerMetadata, fetch_metadata, parse_metadata};
pub use runner::{PlayerCommandRunner, PlayerctlExecutor};
pub use source::MprisSource;
