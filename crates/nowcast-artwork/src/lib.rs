//! nowcast-artwork: cover-art publication boundary.
//! Uploads raw artwork bytes to an anonymous image host and remembers
//! the returned URL per track identity, so one track never uploads
//! twice in a run.

pub mod error;
pub mod publisher;
pub mod uploader;

pub use error::UploadError;
pub use publisher::{ArtworkPublisher, MAX_ARTWORK_BYTES, cache_key_for};
pub use uploader::{ArtworkUploader, CatboxUploader};
