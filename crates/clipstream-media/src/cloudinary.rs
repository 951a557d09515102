use futures_util::future::BoxFuture;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha1::{Digest, Sha1};
use tracing::{info, warn};

use crate::{MediaError, MediaFile, MediaStore, UploadedMedia};

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Optional folder every upload lands in.
    pub folder: Option<String>,
}

/// Signed uploads against Cloudinary's REST upload endpoint.
pub struct Cloudinary {
    client: reqwest::Client,
    config: CloudinaryConfig,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    secure_url: String,
    public_id: String,
    bytes: u64,
}

impl Cloudinary {
    pub fn new(config: CloudinaryConfig) -> Self {
        let endpoint = format!("{}/{}/auto/upload", API_BASE, config.cloud_name);
        Self {
            client: reqwest::Client::new(),
            config,
            endpoint,
        }
    }

    async fn upload_signed(&self, file: MediaFile) -> Result<UploadedMedia, MediaError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut signed: Vec<(&str, &str)> = vec![("timestamp", timestamp.as_str())];
        if let Some(folder) = &self.config.folder {
            signed.push(("folder", folder.as_str()));
        }
        let signature = sign_params(&signed, &self.config.api_secret);

        let part = Part::bytes(file.data.to_vec())
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)?;

        let mut form = Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("timestamp", timestamp.clone())
            .text("signature", signature)
            .part("file", part);
        if let Some(folder) = &self.config.folder {
            form = form.text("folder", folder.clone());
        }

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Cloudinary rejected {}: {} {}", file.file_name, status, body);
            return Err(MediaError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let reply: UploadReply = response.json().await?;
        info!("Uploaded {} to Cloudinary as {}", file.file_name, reply.public_id);

        Ok(UploadedMedia {
            url: reply.secure_url,
            public_id: reply.public_id,
            bytes: reply.bytes,
        })
    }
}

impl MediaStore for Cloudinary {
    fn upload(&self, file: MediaFile) -> BoxFuture<'_, Result<UploadedMedia, MediaError>> {
        Box::pin(self.upload_signed(file))
    }
}

/// Cloudinary request signature: parameters sorted by name, joined as
/// `k=v&k=v`, secret appended, SHA-1 hex digest.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_matches_published_example() {
        let sig = sign_params(
            &[
                ("timestamp", "1315060510"),
                ("public_id", "sample_image"),
                ("eager", "w_400,h_300,c_pad|w_260,h_200,c_crop"),
            ],
            "abcd",
        );
        assert_eq!(sig, "bfd09f95f331f558cbd1320e67aa8d488770583e");
    }

    #[test]
    fn signature_ignores_parameter_order() {
        let a = sign_params(&[("folder", "avatars"), ("timestamp", "1")], "s");
        let b = sign_params(&[("timestamp", "1"), ("folder", "avatars")], "s");
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
    }

    #[test]
    fn endpoint_includes_cloud_name() {
        let store = Cloudinary::new(CloudinaryConfig {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
            folder: None,
        });
        assert_eq!(store.endpoint, "https://api.cloudinary.com/v1_1/demo/auto/upload");
    }
}
