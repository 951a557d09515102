use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart};
use tracing::warn;

use clipstream_media::{MAX_IMAGE_SIZE, MediaFile, is_allowed_image};

use crate::error::ApiError;

/// `axum::Json` whose rejections render as [`ApiError`].
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// A multipart body split into text fields and image files.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, MediaFile>,
}

impl MultipartForm {
    /// Trimmed value of a text field; empty when absent.
    pub fn text(&self, name: &str) -> &str {
        self.fields.get(name).map(|v| v.trim()).unwrap_or("")
    }

    pub fn take_file(&mut self, name: &str) -> Option<MediaFile> {
        self.files.remove(name)
    }
}

/// Buffer a multipart body. Only the names in `file_fields` may carry files,
/// each at most once; files must be images within [`MAX_IMAGE_SIZE`].
/// A file part with no name and no bytes (an untouched `<input type=file>`)
/// counts as absent.
pub async fn read_multipart(
    mut multipart: Multipart,
    file_fields: &[&str],
) -> Result<MultipartForm, ApiError> {
    let mut form = MultipartForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or("").to_string();

        let Some(file_name) = field.file_name().map(str::to_string) else {
            let value = field.text().await?;
            form.fields.insert(name, value);
            continue;
        };

        if !file_fields.contains(&name.as_str()) {
            warn!("Rejected upload in unexpected field '{}'", name);
            return Err(ApiError::bad_request(format!("Unexpected field: {}", name)));
        }
        if form.files.contains_key(&name) {
            return Err(ApiError::bad_request(format!(
                "Only one file allowed in field: {}",
                name
            )));
        }

        let content_type = field.content_type().unwrap_or("").to_string();
        let data = field.bytes().await?;

        if file_name.is_empty() && data.is_empty() {
            continue;
        }
        if !is_allowed_image(&content_type) {
            return Err(ApiError::bad_request(
                "Images must be PNG, JPEG, GIF, or WebP",
            ));
        }
        if data.len() > MAX_IMAGE_SIZE {
            return Err(ApiError::new(
                axum::http::StatusCode::PAYLOAD_TOO_LARGE,
                format!("Image too large (max {}MB)", MAX_IMAGE_SIZE / 1024 / 1024),
            ));
        }

        form.files.insert(
            name,
            MediaFile {
                file_name,
                content_type,
                data,
            },
        );
    }

    Ok(form)
}
