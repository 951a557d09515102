use crate::Database;
use crate::models::{NewUser, SubscriptionRow, UserRow, now_timestamp};
use crate::password;
use anyhow::Result;
use rusqlite::{Connection, ErrorCode, Row};
use uuid::Uuid;

const USER_COLUMNS: &str = "id, username, email, full_name, avatar, cover_image, password, refresh_token, created_at, updated_at";

impl Database {
    // -- Users --

    /// Insert a new user, hashing the plaintext password first.
    pub fn create_user(&self, new: &NewUser) -> Result<UserRow> {
        // Hash outside the connection lock.
        let password_hash = password::hash_password(&new.password)?;
        let now = now_timestamp();

        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            username: new.username.clone(),
            email: new.email.clone(),
            full_name: new.full_name.clone(),
            avatar: new.avatar.clone(),
            cover_image: new.cover_image.clone(),
            password: password_hash,
            refresh_token: None,
            created_at: now.clone(),
            updated_at: now,
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, full_name, avatar, cover_image, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    row.id,
                    row.username,
                    row.email,
                    row.full_name,
                    row.avatar,
                    row.cover_image,
                    row.password,
                    row.created_at,
                    row.updated_at,
                ],
            )?;
            Ok(())
        })?;

        Ok(row)
    }

    pub fn find_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &[&id]))
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &[&username]))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", &[&email]))
    }

    /// First user holding either the username or the email.
    pub fn find_user_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(conn, "username = ?1 OR email = ?2", &[&username, &email])
        })
    }

    /// Overwrite (or clear, with `None`) the stored refresh token.
    pub fn set_refresh_token(&self, id: &str, token: Option<&str>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET refresh_token = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, token, now_timestamp()],
            )?;
            Ok(())
        })
    }

    /// Swap `presented` for `replacement` only if `presented` is the token on
    /// record. Returns whether the swap happened.
    pub fn rotate_refresh_token(&self, id: &str, presented: &str, replacement: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users SET refresh_token = ?3, updated_at = ?4
                 WHERE id = ?1 AND refresh_token = ?2",
                rusqlite::params![id, presented, replacement, now_timestamp()],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn update_password(&self, id: &str, plaintext: &str) -> Result<()> {
        let password_hash = password::hash_password(plaintext)?;
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET password = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, password_hash, now_timestamp()],
            )?;
            Ok(())
        })
    }

    pub fn update_account(&self, id: &str, full_name: &str, email: &str) -> Result<Option<UserRow>> {
        self.update_and_fetch(
            id,
            "UPDATE users SET full_name = ?2, email = ?3, updated_at = ?4 WHERE id = ?1",
            rusqlite::params![id, full_name, email, now_timestamp()],
        )
    }

    pub fn update_avatar(&self, id: &str, url: &str) -> Result<Option<UserRow>> {
        self.update_and_fetch(
            id,
            "UPDATE users SET avatar = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, url, now_timestamp()],
        )
    }

    pub fn update_cover_image(&self, id: &str, url: &str) -> Result<Option<UserRow>> {
        self.update_and_fetch(
            id,
            "UPDATE users SET cover_image = ?2, updated_at = ?3 WHERE id = ?1",
            rusqlite::params![id, url, now_timestamp()],
        )
    }

    /// Run an UPDATE and read the row back under the same lock.
    /// `None` when no row matched `id`.
    fn update_and_fetch(
        &self,
        id: &str,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Option<UserRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(sql, params)?;
            if changed == 0 {
                return Ok(None);
            }
            let row = query_user(&tx, "id = ?1", &[&id])?;
            tx.commit()?;
            Ok(row)
        })
    }

    // -- Subscriptions --

    pub fn create_subscription(&self, subscriber_id: &str, channel_id: &str) -> Result<SubscriptionRow> {
        let now = now_timestamp();
        let row = SubscriptionRow {
            id: Uuid::new_v4().to_string(),
            subscriber_id: subscriber_id.to_string(),
            channel_id: channel_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
        };

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO subscriptions (id, subscriber_id, channel_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    row.id,
                    row.subscriber_id,
                    row.channel_id,
                    row.created_at,
                    row.updated_at,
                ],
            )?;
            Ok(())
        })?;

        Ok(row)
    }

    pub fn count_subscribers(&self, channel_id: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM subscriptions WHERE channel_id = ?1",
                [channel_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

/// True when `err` came from a UNIQUE constraint (duplicate username/email,
/// repeated subscription edge).
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<rusqlite::Error>() {
        Some(rusqlite::Error::SqliteFailure(e, _)) => {
            e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

fn query_user(
    conn: &Connection,
    predicate: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate} LIMIT 1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row(params, map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        full_name: row.get(3)?,
        avatar: row.get(4)?,
        cover_image: row.get(5)?,
        password: row.get(6)?,
        refresh_token: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            full_name: "Test User".to_string(),
            avatar: "https://media.example/avatar.png".to_string(),
            cover_image: None,
            password: "correct horse".to_string(),
        }
    }

    #[test]
    fn create_user_stores_hash_not_plaintext() {
        let db = Database::open_in_memory().unwrap();
        let created = db.create_user(&new_user("alice", "alice@example.com")).unwrap();

        let stored = db.find_user_by_id(&created.id).unwrap().unwrap();
        assert_ne!(stored.password, "correct horse");
        assert!(stored.verify_password("correct horse"));
        assert!(!stored.verify_password("wrong"));
        assert!(stored.refresh_token.is_none());
    }

    #[test]
    fn duplicate_username_or_email_is_a_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        db.create_user(&new_user("alice", "alice@example.com")).unwrap();

        let err = db.create_user(&new_user("alice", "other@example.com")).unwrap_err();
        assert!(is_unique_violation(&err));

        let err = db.create_user(&new_user("bob", "alice@example.com")).unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn lookup_by_username_or_email() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice", "alice@example.com")).unwrap();

        let by_email = db.find_user_by_username_or_email("nobody", "alice@example.com").unwrap();
        assert_eq!(by_email.unwrap().id, alice.id);

        let by_name = db.find_user_by_username_or_email("alice", "nobody@example.com").unwrap();
        assert_eq!(by_name.unwrap().id, alice.id);

        assert!(db.find_user_by_username_or_email("nobody", "nobody@example.com").unwrap().is_none());
        assert!(db.find_user_by_username("alice").unwrap().is_some());
        assert!(db.find_user_by_email("alice@example.com").unwrap().is_some());
    }

    #[test]
    fn rotate_refresh_token_requires_current_token() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice", "alice@example.com")).unwrap();

        // Nothing stored yet: nothing to rotate.
        assert!(!db.rotate_refresh_token(&alice.id, "t1", "t2").unwrap());

        db.set_refresh_token(&alice.id, Some("t1")).unwrap();
        assert!(!db.rotate_refresh_token(&alice.id, "stale", "t2").unwrap());
        assert!(db.rotate_refresh_token(&alice.id, "t1", "t2").unwrap());
        // The old token is spent.
        assert!(!db.rotate_refresh_token(&alice.id, "t1", "t3").unwrap());

        let stored = db.find_user_by_id(&alice.id).unwrap().unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("t2"));

        db.set_refresh_token(&alice.id, None).unwrap();
        let stored = db.find_user_by_id(&alice.id).unwrap().unwrap();
        assert!(stored.refresh_token.is_none());
    }

    #[test]
    fn update_password_rehashes() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice", "alice@example.com")).unwrap();

        db.update_password(&alice.id, "new secret").unwrap();
        let stored = db.find_user_by_id(&alice.id).unwrap().unwrap();
        assert!(stored.verify_password("new secret"));
        assert!(!stored.verify_password("correct horse"));
    }

    #[test]
    fn profile_updates_return_fresh_row() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice", "alice@example.com")).unwrap();

        let updated = db
            .update_account(&alice.id, "Alice Liddell", "liddell@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(updated.full_name, "Alice Liddell");
        assert_eq!(updated.email, "liddell@example.com");

        let updated = db.update_avatar(&alice.id, "https://media.example/a2.png").unwrap().unwrap();
        assert_eq!(updated.avatar, "https://media.example/a2.png");

        let updated = db.update_cover_image(&alice.id, "https://media.example/c.png").unwrap().unwrap();
        assert_eq!(updated.cover_image.as_deref(), Some("https://media.example/c.png"));

        let missing = Uuid::new_v4().to_string();
        assert!(db.update_avatar(&missing, "https://media.example/x.png").unwrap().is_none());
    }

    #[test]
    fn email_change_to_taken_address_conflicts() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice", "alice@example.com")).unwrap();
        db.create_user(&new_user("bob", "bob@example.com")).unwrap();

        let err = db.update_account(&alice.id, "Alice", "bob@example.com").unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn subscriptions_are_unique_per_pair() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice", "alice@example.com")).unwrap();
        let bob = db.create_user(&new_user("bob", "bob@example.com")).unwrap();

        db.create_subscription(&alice.id, &bob.id).unwrap();
        assert_eq!(db.count_subscribers(&bob.id).unwrap(), 1);
        assert_eq!(db.count_subscribers(&alice.id).unwrap(), 0);

        let err = db.create_subscription(&alice.id, &bob.id).unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[test]
    fn subscription_requires_existing_users() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice", "alice@example.com")).unwrap();
        let ghost = Uuid::new_v4().to_string();

        assert!(db.create_subscription(&alice.id, &ghost).is_err());
    }

    #[test]
    fn sanitized_user_has_no_credentials() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice", "alice@example.com")).unwrap();
        db.set_refresh_token(&alice.id, Some("secret-refresh")).unwrap();

        let stored = db.find_user_by_id(&alice.id).unwrap().unwrap();
        let json = serde_json::to_string(&stored.to_public().unwrap()).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("refresh"));
        assert!(!json.contains(&stored.password));
    }
}
