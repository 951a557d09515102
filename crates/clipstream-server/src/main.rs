mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use clipstream_api::{AppState, AppStateInner, TokenConfig};
use clipstream_media::{Cloudinary, CloudinaryConfig, LocalStore, MediaStore};

use crate::config::{Config, MediaBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipstream=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = clipstream_db::Database::open(&config.db_path)?;

    // Media host; the local store also needs its directory served.
    let (media, media_dir): (Box<dyn MediaStore>, Option<PathBuf>) = match &config.media {
        MediaBackend::Local { dir, public_url } => {
            let store = LocalStore::new(dir.clone(), public_url.clone()).await?;
            let served = store.dir().clone();
            info!("Serving local media at {}", public_url);
            (Box::new(store) as Box<dyn MediaStore>, Some(served))
        }
        MediaBackend::Cloudinary {
            cloud_name,
            api_key,
            api_secret,
            folder,
        } => {
            info!("Uploading media to Cloudinary cloud '{}'", cloud_name);
            let store = Cloudinary::new(CloudinaryConfig {
                cloud_name: cloud_name.clone(),
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
                folder: folder.clone(),
            });
            (Box::new(store) as Box<dyn MediaStore>, None)
        }
    };

    let state: AppState = Arc::new(AppStateInner {
        db,
        media,
        tokens: TokenConfig::new(
            config.access_token_secret.clone(),
            config.access_token_ttl,
            config.refresh_token_secret.clone(),
            config.refresh_token_ttl,
        ),
    });

    let mut app: Router = clipstream_api::router(state);
    if let Some(dir) = media_dir {
        app = app.nest_service("/media", ServeDir::new(dir));
    }

    let app = app.layer(cors_layer(config.cors_origin.as_deref())?).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Clipstream server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Cookies only travel cross-origin with credentials, which rules out a
/// wildcard origin. Without a configured origin, fall back to permissive.
fn cors_layer(origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let Some(origin) = origin else {
        return Ok(CorsLayer::permissive());
    };

    Ok(CorsLayer::new()
        .allow_origin(origin.parse::<HeaderValue>()?)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
