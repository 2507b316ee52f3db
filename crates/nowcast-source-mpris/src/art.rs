//! Cover-art resolution: MPRIS hands out an `artUrl` that is either a
//! local `file://` path or an `http(s)` URL; both are resolved to raw
//! bytes here. The last resolution is memoized per URL so an unchanged
//! track costs no IO on later polls.

use std::time::Duration;

use parking_lot::Mutex;
use url::Url;

use crate::error::MprisError;

const ART_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct ArtFetcher {
    client: Mutex<Option<reqwest::blocking::Client>>,
    memo: Mutex<Option<(String, Option<Vec<u8>>)>>,
}

impl ArtFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve an artUrl to bytes. Unsupported schemes resolve to
    /// `None`; transport and filesystem faults are surfaced so the
    /// caller can decide to proceed without artwork.
    pub fn fetch(&self, art_url: &str) -> Result<Option<Vec<u8>>, MprisError> {
        if let Some((key, bytes)) = self.memo.lock().as_ref() {
            if key == art_url {
                return Ok(bytes.clone());
            }
        }

        let url = Url::parse(art_url)
            .map_err(|e| MprisError::Parse(format!("bad artUrl {art_url}: {e}")))?;
        let bytes = match url.scheme() {
            "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| MprisError::Parse(format!("artUrl is not a local path: {art_url}")))?;
                Some(std::fs::read(path)?)
            }
            "http" | "https" => {
                let body = self
                    .client()?
                    .get(url)
                    .send()?
                    .error_for_status()?
                    .bytes()?;
                Some(body.to_vec())
            }
            _ => None,
        };

        *self.memo.lock() = Some((art_url.to_string(), bytes.clone()));
        Ok(bytes)
    }

    fn client(&self) -> Result<reqwest::blocking::Client, MprisError> {
        let mut slot = self.client.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(ART_HTTP_TIMEOUT)
            .build()?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_url_resolves_to_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cover.jpg");
        std::fs::write(&path, b"jpeg bytes").expect("write");

        let url = Url::from_file_path(&path).expect("file url");
        let fetcher = ArtFetcher::new();
        let bytes = fetcher.fetch(url.as_str()).expect("fetch").expect("bytes");
        assert_eq!(bytes, b"jpeg bytes");
    }

    #[test]
    fn repeated_fetch_is_memoized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cover.jpg");
        std::fs::write(&path, b"jpeg bytes").expect("write");
        let url = Url::from_file_path(&path).expect("file url");

        let fetcher = ArtFetcher::new();
        fetcher.fetch(url.as_str()).expect("first fetch");

        // The file is gone, but the memo still answers for this URL.
        std::fs::remove_file(&path).expect("remove");
        let bytes = fetcher.fetch(url.as_str()).expect("memoized").expect("bytes");
        assert_eq!(bytes, b"jpeg bytes");
    }

    #[test]
    fn new_url_invalidates_memo() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("a.jpg");
        let second = dir.path().join("b.jpg");
        std::fs::write(&first, b"aaa").expect("write");
        std::fs::write(&second, b"bbb").expect("write");

        let fetcher = ArtFetcher::new();
        let url_a = Url::from_file_path(&first).expect("url");
        let url_b = Url::from_file_path(&second).expect("url");
        assert_eq!(fetcher.fetch(url_a.as_str()).expect("a"), Some(b"aaa".to_vec()));
        assert_eq!(fetcher.fetch(url_b.as_str()).expect("b"), Some(b"bbb".to_vec()));
    }

    #[test]
    fn unsupported_scheme_is_none() {
        let fetcher = ArtFetcher::new();
        let bytes = fetcher.fetch("data:image/png;base64,AAAA").expect("fetch");
        assert_eq!(bytes, None);
    }

    #[test]
    fn missing_file_is_io_error() {
        let fetcher = ArtFetcher::new();
        let result = fetcher.fetch("file:///nonexistent/nowcast-test-cover.jpg");
        assert!(matches!(result, Err(MprisError::Io(_))));
    }

    #[test]
    fn garbage_url_is_parse_error() {
        let fetcher = ArtFetcher::new();
        assert!(matches!(
            fetcher.fetch("not a url"),
            Err(MprisError::Parse(_))
        ));
    }
}
