use axum::{
    Extension, Json,
    extract::{Multipart, State},
    response::IntoResponse,
};
use tracing::{info, warn};

use clipstream_db::models::UserRow;
use clipstream_types::api::{ApiResponse, ChangePasswordRequest, Empty, UpdateAccountRequest};
use clipstream_types::models::User;

use crate::auth::{AVATAR_FIELD, COVER_IMAGE_FIELD};
use crate::error::ApiError;
use crate::extract::{ApiJson, read_multipart};
use crate::middleware::CurrentUser;
use crate::state::{AppState, with_db};

/// POST /change-password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.old_password.is_empty() || req.new_password.trim().is_empty() {
        return Err(ApiError::bad_request("Old and new password are required"));
    }

    let user_id = current.id.clone();
    let old_password = req.old_password;
    let old_ok = with_db(&state, move |db| {
        Ok(db
            .find_user_by_id(&user_id)?
            .map(|user| user.verify_password(&old_password)))
    })
    .await?
    .ok_or_else(|| ApiError::unauthorized("User not logged in"))?;

    if !old_ok {
        warn!("Wrong current password from {}", current.user.username);
        return Err(ApiError::unauthorized("Incorrect password"));
    }

    let user_id = current.id.clone();
    let new_password = req.new_password;
    with_db(&state, move |db| db.update_password(&user_id, &new_password)).await?;

    info!("User {} changed password", current.user.username);

    Ok(Json(ApiResponse::new(200, Empty {}, "Password changed successfully")))
}

/// GET /get-user
pub async fn get_current_user(Extension(current): Extension<CurrentUser>) -> Json<ApiResponse<User>> {
    Json(ApiResponse::new(
        200,
        current.user,
        "Current user fetched successfully",
    ))
}

/// PATCH /update-account: JSON {fullName, email}, both required.
pub async fn update_account(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    ApiJson(req): ApiJson<UpdateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let full_name = req.full_name.trim().to_string();
    let email = req.email.trim().to_lowercase();
    if full_name.is_empty() || email.is_empty() {
        return Err(ApiError::bad_request("All fields are required"));
    }

    let user_id = current.id.clone();
    let updated = with_db(&state, move |db| {
        if let Some(holder) = db.find_user_by_email(&email)?
            && holder.id != user_id
        {
            return Ok(Err(ApiError::conflict("Email is already in use")));
        }
        // A concurrent change can still claim the address before the write.
        email_conflict(db.update_account(&user_id, &full_name, &email))
    })
    .await??;

    respond_with_user(updated, "Account details updated successfully")
}

/// PATCH /avatar: multipart field `avatar`.
pub async fn update_avatar(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_multipart(multipart, &[AVATAR_FIELD]).await?;
    let file = form
        .take_file(AVATAR_FIELD)
        .ok_or_else(|| ApiError::bad_request("Avatar file is missing"))?;

    // The previous asset stays on the media host.
    let uploaded = state.media.upload(file).await?;

    let user_id = current.id.clone();
    let updated = with_db(&state, move |db| db.update_avatar(&user_id, &uploaded.url)).await?;

    respond_with_user(updated, "Avatar image updated successfully")
}

/// PATCH /cover-image: multipart field `coverImage`.
pub async fn update_cover_image(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_multipart(multipart, &[COVER_IMAGE_FIELD]).await?;
    let file = form
        .take_file(COVER_IMAGE_FIELD)
        .ok_or_else(|| ApiError::bad_request("Cover image file is missing"))?;

    let uploaded = state.media.upload(file).await?;

    let user_id = current.id.clone();
    let updated =
        with_db(&state, move |db| db.update_cover_image(&user_id, &uploaded.url)).await?;

    respond_with_user(updated, "Cover image updated successfully")
}

/// Split a UNIQUE violation on the email column out as a 409.
fn email_conflict<T>(result: anyhow::Result<T>) -> anyhow::Result<Result<T, ApiError>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e) if clipstream_db::is_unique_violation(&e) => {
            Ok(Err(ApiError::conflict("Email is already in use")))
        }
        Err(e) => Err(e),
    }
}

fn respond_with_user(
    updated: Option<UserRow>,
    message: &str,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let row = updated.ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(ApiResponse::new(200, row.to_public()?, message)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use clipstream_db::Database;
    use clipstream_db::models::NewUser;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            full_name: "Test User".to_string(),
            avatar: "https://media.test/a.png".to_string(),
            cover_image: None,
            password: "correct horse".to_string(),
        }
    }

    #[test]
    fn lost_email_race_reports_email_in_use() {
        let db = Database::open_in_memory().unwrap();
        let alice = db.create_user(&new_user("alice")).unwrap();
        db.create_user(&new_user("bob")).unwrap();

        // Skips the lookup, as a request that checked before bob took the address would.
        let err = email_conflict(db.update_account(&alice.id, "Alice", "bob@example.com"))
            .unwrap()
            .unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "Email is already in use");
    }

    #[test]
    fn other_failures_pass_through() {
        assert!(email_conflict::<()>(Err(anyhow::anyhow!("disk on fire"))).is_err());
        assert!(matches!(email_conflict(Ok(7)), Ok(Ok(7))));
    }
}
