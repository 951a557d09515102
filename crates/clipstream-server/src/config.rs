use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me", "dev-secret-change-me", "secret"];

#[derive(Debug, Clone)]
pub enum MediaBackend {
    Local { dir: PathBuf, public_url: String },
    Cloudinary {
        cloud_name: String,
        api_key: String,
        api_secret: String,
        folder: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cors_origin: Option<String>,
    pub access_token_secret: String,
    pub access_token_ttl: Duration,
    pub refresh_token_secret: String,
    pub refresh_token_ttl: Duration,
    pub media: MediaBackend,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let host = or("CLIPSTREAM_HOST", "0.0.0.0");
        let port: u16 = or("PORT", "8000").parse().context("PORT must be a port number")?;

        let access_token_secret = required_secret(&get, "ACCESS_TOKEN_SECRET")?;
        let refresh_token_secret = required_secret(&get, "REFRESH_TOKEN_SECRET")?;
        if access_token_secret == refresh_token_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let access_token_ttl = parse_expiry(&or("ACCESS_TOKEN_EXPIRY", "1d"))
            .context("invalid ACCESS_TOKEN_EXPIRY")?;
        let refresh_token_ttl = parse_expiry(&or("REFRESH_TOKEN_EXPIRY", "10d"))
            .context("invalid REFRESH_TOKEN_EXPIRY")?;

        let media = match or("MEDIA_BACKEND", "local").as_str() {
            "local" => MediaBackend::Local {
                dir: or("MEDIA_DIR", "./public/media").into(),
                public_url: get("MEDIA_PUBLIC_URL")
                    .unwrap_or_else(|| format!("http://localhost:{}/media", port)),
            },
            "cloudinary" => MediaBackend::Cloudinary {
                cloud_name: required(&get, "CLOUDINARY_CLOUD_NAME")?,
                api_key: required(&get, "CLOUDINARY_API_KEY")?,
                api_secret: required(&get, "CLOUDINARY_API_SECRET")?,
                folder: get("CLOUDINARY_FOLDER").filter(|f| !f.is_empty()),
            },
            other => bail!("MEDIA_BACKEND must be 'local' or 'cloudinary', got '{}'", other),
        };

        Ok(Self {
            host,
            port,
            db_path: or("CLIPSTREAM_DB_PATH", "clipstream.db").into(),
            cors_origin: get("CORS_ORIGIN").filter(|o| !o.is_empty() && o != "*"),
            access_token_secret,
            access_token_ttl,
            refresh_token_secret,
            refresh_token_ttl,
            media,
        })
    }
}

fn required<F>(get: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{} is required", key))
}

fn required_secret<F>(get: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let secret = required(get, key)?;
    if PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
        bail!("{} is still a placeholder; set a random value", key);
    }
    Ok(secret)
}

/// Upper bound for token lifetimes.
const MAX_EXPIRY_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Token lifetime: bare seconds or a number with an `s`/`m`/`h`/`d` suffix.
pub fn parse_expiry(raw: &str) -> Result<Duration> {
    let raw = raw.trim();
    let (digits, unit) = match raw.char_indices().last() {
        Some((idx, c)) if c.is_ascii_alphabetic() => (&raw[..idx], c),
        _ => (raw, 's'),
    };

    let n: u64 = digits
        .parse()
        .with_context(|| format!("'{}' is not a duration", raw))?;
    let unit_secs: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        other => bail!("unknown duration unit '{}' in '{}'", other, raw),
    };
    let secs = n
        .checked_mul(unit_secs)
        .filter(|s| *s <= MAX_EXPIRY_SECS)
        .with_context(|| format!("'{}' exceeds the 10 year maximum", raw))?;
    if secs == 0 {
        bail!("duration must be positive");
    }
    Ok(Duration::from_secs(secs))
}
