use std::path::PathBuf;

use futures_util::future::BoxFuture;
use tokio::fs;
use tracing::info;
use uuid::Uuid;

use crate::{MediaError, MediaFile, MediaStore, UploadedMedia, extension_for};

/// Stores uploads as flat files at `{dir}/{uuid}.{ext}`.
///
/// URLs are `{public_base}/{uuid}.{ext}`; the server is expected to serve
/// `dir` at that base.
pub struct LocalStore {
    dir: PathBuf,
    public_base: String,
}

impl LocalStore {
    pub async fn new(dir: PathBuf, public_base: impl Into<String>) -> Result<Self, MediaError> {
        fs::create_dir_all(&dir).await?;
        info!("Local media directory: {}", dir.display());
        Ok(Self {
            dir,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    async fn write(&self, file: MediaFile) -> Result<UploadedMedia, MediaError> {
        let public_id = Uuid::new_v4().to_string();
        let file_name = format!("{}.{}", public_id, extension_for(&file.content_type));

        fs::write(self.dir.join(&file_name), &file.data).await?;

        Ok(UploadedMedia {
            url: format!("{}/{}", self.public_base, file_name),
            public_id,
            bytes: file.data.len() as u64,
        })
    }
}

impl MediaStore for LocalStore {
    fn upload(&self, file: MediaFile) -> BoxFuture<'_, Result<UploadedMedia, MediaError>> {
        Box::pin(self.write(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn writes_file_and_builds_public_url() {
        let dir = std::env::temp_dir().join(format!("clipstream-media-{}", Uuid::new_v4()));
        let store = LocalStore::new(dir.clone(), "http://localhost:8000/media/").await.unwrap();

        let uploaded = store
            .upload(MediaFile {
                file_name: "me.png".into(),
                content_type: "image/png".into(),
                data: Bytes::from_static(b"\x89PNG fake"),
            })
            .await
            .unwrap();

        let expected_name = format!("{}.png", uploaded.public_id);
        assert_eq!(uploaded.url, format!("http://localhost:8000/media/{}", expected_name));
        assert_eq!(uploaded.bytes, 9);

        let on_disk = fs::read(store.dir().join(&expected_name)).await.unwrap();
        assert_eq!(on_disk, b"\x89PNG fake");

        fs::remove_dir_all(&dir).await.ok();
    }
}
