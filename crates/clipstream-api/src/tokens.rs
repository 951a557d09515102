use std::time::Duration;

use anyhow::{Context, Result};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use clipstream_db::models::UserRow;
use clipstream_types::api::{AccessClaims, RefreshClaims, TokenPair};

/// Secrets and lifetimes for both token kinds. Access and refresh tokens use
/// separate secrets, so one can never be replayed as the other.
#[derive(Clone)]
pub struct TokenConfig {
    access_secret: String,
    access_ttl: Duration,
    refresh_secret: String,
    refresh_ttl: Duration,
}

impl TokenConfig {
    pub fn new(
        access_secret: impl Into<String>,
        access_ttl: Duration,
        refresh_secret: impl Into<String>,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_secret: access_secret.into(),
            access_ttl,
            refresh_secret: refresh_secret.into(),
            refresh_ttl,
        }
    }

    pub fn issue_access(&self, user: &UserRow) -> Result<String> {
        let (iat, exp) = window(self.access_ttl)?;
        let claims = AccessClaims {
            sub: user.id.parse().context("user id is not a UUID")?,
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            iat,
            exp,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.access_secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn issue_refresh(&self, user_id: &str) -> Result<String> {
        let (iat, exp) = window(self.refresh_ttl)?;
        let claims = RefreshClaims {
            sub: user_id.parse().context("user id is not a UUID")?,
            jti: Uuid::new_v4(),
            iat,
            exp,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.refresh_secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn issue_pair(&self, user: &UserRow) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access(user)?,
            refresh_token: self.issue_refresh(&user.id)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> jsonwebtoken::errors::Result<AccessClaims> {
        decode::<AccessClaims>(
            token,
            &DecodingKey::from_secret(self.access_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> jsonwebtoken::errors::Result<RefreshClaims> {
        decode::<RefreshClaims>(
            token,
            &DecodingKey::from_secret(self.refresh_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
    }
}

/// `(iat, exp)` for a token issued now.
fn window(ttl: Duration) -> Result<(usize, usize)> {
    let now = usize::try_from(chrono::Utc::now().timestamp()).context("clock before epoch")?;
    let exp = usize::try_from(ttl.as_secs())
        .ok()
        .and_then(|ttl| now.checked_add(ttl))
        .context("token lifetime overflows the expiry timestamp")?;
    Ok((now, exp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TokenConfig {
        TokenConfig::new(
            "access-secret",
            Duration::from_secs(900),
            "refresh-secret",
            Duration::from_secs(86_400),
        )
    }

    fn user() -> UserRow {
        UserRow {
            id: Uuid::new_v4().to_string(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            full_name: "Alice".into(),
            avatar: "https://media.example/a.png".into(),
            cover_image: None,
            password: "$argon2id$irrelevant".into(),
            refresh_token: None,
            created_at: "2024-01-01T00:00:00.000Z".into(),
            updated_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn access_token_round_trips_identity() {
        let cfg = config();
        let user = user();
        let token = cfg.issue_access(&user).unwrap();

        let claims = cfg.verify_access(&token).unwrap();
        assert_eq!(claims.sub.to_string(), user.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.exp - claims.iat, 900);
    }

    #[test]
    fn token_kinds_are_not_interchangeable() {
        let cfg = config();
        let user = user();
        let pair = cfg.issue_pair(&user).unwrap();

        assert!(cfg.verify_access(&pair.refresh_token).is_err());
        assert!(cfg.verify_refresh(&pair.access_token).is_err());
        assert!(cfg.verify_refresh(&pair.refresh_token).is_ok());
    }

    #[test]
    fn consecutive_refresh_tokens_differ() {
        let cfg = config();
        let user = user();
        let a = cfg.issue_refresh(&user.id).unwrap();
        let b = cfg.issue_refresh(&user.id).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn expired_token_is_rejected() {
        let cfg = config();
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = RefreshClaims {
            sub: Uuid::new_v4(),
            jti: Uuid::new_v4(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"refresh-secret"),
        )
        .unwrap();

        assert!(cfg.verify_refresh(&token).is_err());
    }

    #[test]
    fn overflowing_lifetime_is_an_error() {
        let cfg = TokenConfig::new(
            "access-secret",
            Duration::from_secs(u64::MAX),
            "refresh-secret",
            Duration::from_secs(u64::MAX),
        );
        let user = user();
        assert!(cfg.issue_access(&user).is_err());
        assert!(cfg.issue_refresh(&user.id).is_err());
    }

    #[test]
    fn tampered_token_is_rejected() {
        let cfg = config();
        let mut token = cfg.issue_access(&user()).unwrap();
        token.push('x');
        assert!(cfg.verify_access(&token).is_err());
    }
}
