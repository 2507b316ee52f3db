//! Artwork upload error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("artwork of {0} bytes exceeds the upload limit")]
    TooLarge(usize),

    #[error("artwork is empty")]
    Empty,

    #[error("upload rejected with HTTP {0}")]
    Status(u16),

    #[error("upload host returned an implausible body: {0:?}")]
    BadResponse(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
