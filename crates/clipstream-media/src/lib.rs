//! Media host abstraction for avatars and cover images.
//!
//! Handlers hand a fully-buffered [`MediaFile`] to a [`MediaStore`] and get a
//! public URL back. Two stores exist: [`Cloudinary`] for production and
//! [`LocalStore`] for development, which writes into a directory the server
//! exposes under `/media`.

pub mod cloudinary;
pub mod local;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use thiserror::Error;

pub use cloudinary::{Cloudinary, CloudinaryConfig};
pub use local::LocalStore;

/// 8 MB upload limit for profile images
pub const MAX_IMAGE_SIZE: usize = 8 * 1024 * 1024;

pub const ALLOWED_IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

/// A file received from a client, ready to be pushed to the media host.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Where an upload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
    pub bytes: u64,
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("media host request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("media host rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },
}

pub trait MediaStore: Send + Sync {
    fn upload(&self, file: MediaFile) -> BoxFuture<'_, Result<UploadedMedia, MediaError>>;
}

pub fn is_allowed_image(content_type: &str) -> bool {
    ALLOWED_IMAGE_TYPES.contains(&content_type)
}

pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/jpeg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_common_image_types_are_allowed() {
        assert!(is_allowed_image("image/png"));
        assert!(is_allowed_image("image/webp"));
        assert!(!is_allowed_image("image/svg+xml"));
        assert!(!is_allowed_image("application/pdf"));
    }

    #[test]
    fn unknown_types_fall_back_to_bin() {
        assert_eq!(extension_for("image/jpeg"), "jpg");
        assert_eq!(extension_for("text/plain"), "bin");
    }
}
