//! Identity-keyed artwork publication cache.

use std::collections::HashMap;

use parking_lot::Mutex;
use sha1::{Digest, Sha1};

use nowcast_core::TrackSnapshot;

use crate::error::UploadError;
use crate::uploader::ArtworkUploader;

/// Upload limit enforced before any transport work.
pub const MAX_ARTWORK_BYTES: usize = 20 * 1024 * 1024;

/// Filename presented to the host. The bytes are whatever the player
/// handed over; hosts key on the extension, not the content.
const UPLOAD_FILENAME: &str = "cover.jpg";

/// Stable identity hash over (title, artist, source).
///
/// Keyed on identity rather than the bytes themselves: players
/// re-encode thumbnails between polls, so byte hashes would re-upload
/// the same cover over and over.
pub fn cache_key_for(snapshot: &TrackSnapshot) -> String {
    let mut hasher = Sha1::new();
    hasher.update(snapshot.title.as_bytes());
    hasher.update([0x1f]);
    hasher.update(snapshot.artist.as_bytes());
    hasher.update([0x1f]);
    hasher.update(snapshot.source.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Remembers which track identities already have a public artwork URL.
/// In-memory only; a restart re-uploads on first publish.
pub struct ArtworkPublisher<U> {
    uploader: U,
    cache: Mutex<HashMap<String, String>>,
}

impl<U: ArtworkUploader> ArtworkPublisher<U> {
    pub fn new(uploader: U) -> Self {
        Self {
            uploader,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a cache key to a public URL, uploading at most once per
    /// key. The cache is written only after a confirmed upload, so a
    /// failed attempt is retried naturally on the next call.
    pub fn publish(&self, cache_key: &str, bytes: &[u8]) -> Result<String, UploadError> {
        if let Some(url) = self.cache.lock().get(cache_key) {
            return Ok(url.clone());
        }
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > MAX_ARTWORK_BYTES {
            return Err(UploadError::TooLarge(bytes.len()));
        }
        let url = self.uploader.upload(UPLOAD_FILENAME, bytes)?;
        self.cache
            .lock()
            .insert(cache_key.to_string(), url.clone());
        Ok(url)
    }

    /// Number of uploaded artworks remembered this run.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use nowcast_core::SourceId;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn snap(title: &str, artist: &str, source: SourceId) -> TrackSnapshot {
        TrackSnapshot {
            title: title.to_string(),
            artist: artist.to_string(),
            album: None,
            artwork_bytes: None,
            source,
            position_ms: None,
            duration_ms: None,
            is_playing: true,
        }
    }

    #[derive(Default)]
    struct FakeUploader {
        calls: AtomicUsize,
        fail_next: AtomicBool,
    }

    impl ArtworkUploader for FakeUploader {
        fn upload(&self, _filename: &str, bytes: &[u8]) -> Result<String, UploadError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(UploadError::Status(503));
            }
            Ok(format!("https://files.catbox.moe/{}.jpg", bytes.len()))
        }
    }

    #[test]
    fn cache_key_ignores_bytes_and_position() {
        let mut a = snap("Song A", "Artist X", SourceId::Mpris);
        let mut b = snap("Song A", "Artist X", SourceId::Mpris);
        a.artwork_bytes = Some(vec![1, 2, 3]);
        a.position_ms = Some(10_000);
        b.artwork_bytes = Some(vec![9, 9, 9, 9]);
        b.position_ms = Some(90_000);
        assert_eq!(cache_key_for(&a), cache_key_for(&b));
    }

    #[test]
    fn cache_key_separates_identities() {
        let base = snap("Song A", "Artist X", SourceId::Mpris);
        assert_ne!(
            cache_key_for(&base),
            cache_key_for(&snap("Song B", "Artist X", SourceId::Mpris))
        );
        assert_ne!(
            cache_key_for(&base),
            cache_key_for(&snap("Song A", "Artist Y", SourceId::Mpris))
        );
        assert_ne!(
            cache_key_for(&base),
            cache_key_for(&snap("Song A", "Artist X", SourceId::Spotify))
        );
    }

    #[test]
    fn cache_key_fields_do_not_collide_across_boundaries() {
        // "ab" + "c" must not hash like "a" + "bc".
        assert_ne!(
            cache_key_for(&snap("ab", "c", SourceId::Mpris)),
            cache_key_for(&snap("a", "bc", SourceId::Mpris))
        );
    }

    #[test]
    fn cache_key_is_sha1_hex() {
        let key = cache_key_for(&snap("Song A", "Artist X", SourceId::Mpris));
        assert_eq!(key.len(), 40);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn publish_uploads_once_per_identity() {
        let publisher = ArtworkPublisher::new(FakeUploader::default());
        let key = cache_key_for(&snap("Song A", "Artist X", SourceId::Mpris));

        let first = publisher.publish(&key, &[1, 2, 3, 4]).expect("first");
        // Different bytes, same identity: cached URL, no second upload.
        let second = publisher.publish(&key, &[9; 128]).expect("second");
        assert_eq!(first, second);
        assert_eq!(publisher.uploader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(publisher.cache_len(), 1);
    }

    #[test]
    fn failed_upload_is_not_cached() {
        let uploader = FakeUploader::default();
        uploader.fail_next.store(true, Ordering::SeqCst);
        let publisher = ArtworkPublisher::new(uploader);
        let key = cache_key_for(&snap("Song A", "Artist X", SourceId::Mpris));

        let err = publisher.publish(&key, &[1, 2, 3]).expect_err("first fails");
        assert!(matches!(err, UploadError::Status(503)));
        assert_eq!(publisher.cache_len(), 0);

        // Next call retries and caches.
        publisher.publish(&key, &[1, 2, 3]).expect("retry succeeds");
        assert_eq!(publisher.uploader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(publisher.cache_len(), 1);
    }

    #[test]
    fn empty_and_oversized_bytes_never_reach_the_uploader() {
        let publisher = ArtworkPublisher::new(FakeUploader::default());
        let key = cache_key_for(&snap("Song A", "Artist X", SourceId::Mpris));

        assert!(matches!(
            publisher.publish(&key, &[]),
            Err(UploadError::Empty)
        ));
        let oversized = vec![0u8; MAX_ARTWORK_BYTES + 1];
        assert!(matches!(
            publisher.publish(&key, &oversized),
            Err(UploadError::TooLarge(_))
        ));
        assert_eq!(publisher.uploader.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn distinct_identities_upload_separately() {
        let publisher = ArtworkPublisher::new(FakeUploader::default());
        let key_a = cache_key_for(&snap("Song A", "Artist X", SourceId::Mpris));
        let key_b = cache_key_for(&snap("Song B", "Artist Y", SourceId::Spotify));

        publisher.publish(&key_a, &[1, 2]).expect("a");
        publisher.publish(&key_b, &[1, 2, 3]).expect("b");
        assert_eq!(publisher.uploader.calls.load(Ordering::SeqCst), 2);
        assert_eq!(publisher.cache_len(), 2);
    }
}
