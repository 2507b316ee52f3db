//! ArtworkUploader trait and the anonymous catbox.moe transport.

use std::time::Duration;

use parking_lot::Mutex;
use reqwest::blocking::multipart::{Form, Part};

use crate::error::UploadError;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(10);
/// The response body must name this host to count as an upload URL.
const EXPECTED_HOST: &str = "catbox.moe";
/// Sanity cap on the returned URL length.
const MAX_URL_LEN: usize = 500;

/// Pushes raw image bytes to a public host and returns the URL they
/// are now served under. Enables fake injection for cache tests.
pub trait ArtworkUploader: Send + Sync {
    fn upload(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError>;
}

impl<T: ArtworkUploader + ?Sized> ArtworkUploader for &T {
    fn upload(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError> {
        (**self).upload(filename, bytes)
    }
}

/// Anonymous multipart POST against the catbox upload API. The
/// response body is the public URL in plain text.
pub struct CatboxUploader {
    endpoint: String,
    http: Mutex<Option<reqwest::blocking::Client>>,
}

impl CatboxUploader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: Mutex::new(None),
        }
    }

    fn http(&self) -> Result<reqwest::blocking::Client, UploadError> {
        let mut slot = self.http.lock();
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()?;
        *slot = Some(client.clone());
        Ok(client)
    }
}

impl ArtworkUploader for CatboxUploader {
    fn upload(&self, filename: &str, bytes: &[u8]) -> Result<String, UploadError> {
        let part = Part::bytes(bytes.to_vec())
            .file_name(filename.to_string())
            .mime_str("image/jpeg")?;
        let form = Form::new()
            .text("reqtype", "fileupload")
            .part("fileToUpload", part);

        let resp = self.http()?.post(&self.endpoint).multipart(form).send()?;
        if !resp.status().is_success() {
            return Err(UploadError::Status(resp.status().as_u16()));
        }

        let url = resp.text()?.trim().to_string();
        if url.is_empty()
            || !url.starts_with("http")
            || !url.contains(EXPECTED_HOST)
            || url.len() >= MAX_URL_LEN
        {
            return Err(UploadError::BadResponse(url));
        }
        Ok(url)
    }
}
