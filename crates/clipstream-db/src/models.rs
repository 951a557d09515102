//! Database row types. These map directly to SQLite rows and stay distinct
//! from the clipstream-types API models so the DB layer carries no wire concerns.
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use clipstream_types::models::User;

use crate::password;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    /// Argon2id PHC string.
    pub password: String,
    pub refresh_token: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    pub fn verify_password(&self, candidate: &str) -> bool {
        password::verify_password(candidate, &self.password)
    }

    /// Strip credentials and convert to the wire model.
    pub fn to_public(&self) -> Result<User> {
        Ok(User {
            id: self
                .id
                .parse()
                .map_err(|e| anyhow!("Corrupt user id '{}': {}", self.id, e))?,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            avatar: self.avatar.clone(),
            cover_image: self.cover_image.clone(),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Input for a new account. `password` is plaintext; it is hashed on insert.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub avatar: String,
    pub cover_image: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct SubscriptionRow {
    pub id: String,
    pub subscriber_id: String,
    pub channel_id: String,
    pub created_at: String,
    pub updated_at: String,
}

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand through the sqlite shell use datetime('now').
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .map_err(|e| anyhow!("Corrupt timestamp '{}': {}", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_and_sqlite_timestamps() {
        assert!(parse_timestamp("2024-03-01T10:00:00.000Z").is_ok());
        assert!(parse_timestamp("2024-03-01 10:00:00").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
