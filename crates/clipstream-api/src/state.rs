use std::sync::Arc;

use tracing::error;

use clipstream_db::Database;
use clipstream_media::MediaStore;

use crate::error::ApiError;
use crate::tokens::TokenConfig;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub media: Box<dyn MediaStore>,
    pub tokens: TokenConfig,
}

/// Run a blocking DB closure off the async runtime.
pub async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("Something went wrong")
        })?
        .map_err(ApiError::from)
}
