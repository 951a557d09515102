use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::{error, info, warn};

use clipstream_db::models::NewUser;
use clipstream_types::api::{
    ApiResponse, Empty, LoginRequest, LoginResponse, MessageResponse, RefreshRequest,
};

use crate::cookies::{self, REFRESH_COOKIE};
use crate::error::ApiError;
use crate::extract::{ApiJson, read_multipart};
use crate::middleware::CurrentUser;
use crate::state::{AppState, with_db};

pub const AVATAR_FIELD: &str = "avatar";
pub const COVER_IMAGE_FIELD: &str = "coverImage";

const REGISTER_FIELDS: [&str; 4] = ["fullName", "email", "password", "username"];

/// POST /register (multipart): fullName, email, password, username,
/// avatar (required file), coverImage (optional file).
pub async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut form = read_multipart(multipart, &[AVATAR_FIELD, COVER_IMAGE_FIELD]).await?;

    let missing: Vec<String> = REGISTER_FIELDS
        .iter()
        .filter(|name| form.text(name).is_empty())
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::bad_request("All fields are required").with_errors(missing));
    }

    let username = form.text("username").to_lowercase();
    let email = form.text("email").to_lowercase();
    let full_name = form.text("fullName").to_string();
    // Checked for blankness above, stored exactly as sent.
    let password = form.fields.remove("password").unwrap_or_default();

    let (u, e) = (username.clone(), email.clone());
    if with_db(&state, move |db| db.find_user_by_username_or_email(&u, &e))
        .await?
        .is_some()
    {
        return Err(ApiError::conflict("User with email or username already exists"));
    }

    let avatar_file = form
        .take_file(AVATAR_FIELD)
        .ok_or_else(|| ApiError::bad_request("Avatar file is required"))?;
    let cover_file = form.take_file(COVER_IMAGE_FIELD);

    let avatar = state.media.upload(avatar_file).await?;
    let cover_image = match cover_file {
        Some(file) => Some(state.media.upload(file).await?),
        None => None,
    };

    let new_user = NewUser {
        username,
        email,
        full_name,
        avatar: avatar.url,
        cover_image: cover_image.map(|c| c.url),
        password,
    };
    let created = with_db(&state, move |db| db.create_user(&new_user)).await?;

    info!("Registered user {} ({})", created.username, created.id);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(
            201,
            created.to_public()?,
            "User registered successfully",
        )),
    ))
}

/// POST /login: issues a token pair, stores the refresh token, sets cookies.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_lowercase();
    if username.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let lookup = username.clone();
    let password = req.password;
    let (user, password_ok) = with_db(&state, move |db| {
        let Some(user) = db.find_user_by_username(&lookup)? else {
            return Ok(None);
        };
        let ok = user.verify_password(&password);
        Ok(Some((user, ok)))
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !password_ok {
        warn!("Failed login for {}", username);
        return Err(ApiError::unauthorized("Incorrect login credentials"));
    }

    let pair = state.tokens.issue_pair(&user).map_err(|e| {
        error!("Token issuance failed for {}: {:#}", user.id, e);
        ApiError::internal("Something went wrong while generating access and refresh tokens")
    })?;

    let user_id = user.id.clone();
    let refresh = pair.refresh_token.clone();
    let user = with_db(&state, move |db| {
        db.set_refresh_token(&user_id, Some(&refresh))?;
        db.find_user_by_id(&user_id)
    })
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    info!("User {} logged in", user.username);

    let body = ApiResponse::new(
        200,
        LoginResponse {
            user: user.to_public()?,
            access_token: pair.access_token.clone(),
            refresh_token: pair.refresh_token.clone(),
        },
        "User logged in successfully",
    );
    Ok((cookies::set_tokens(jar, &pair), Json(body)))
}

/// GET /testlogin: only reachable with a valid access token.
pub async fn test_login(Extension(current): Extension<CurrentUser>) -> Json<MessageResponse> {
    Json(MessageResponse {
        message: format!(
            "Super secret data here. Only visible after logging in, {}.",
            current.user.username
        ),
    })
}

/// POST /logout: forget the stored refresh token and expire both cookies.
pub async fn logout(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = current.id.clone();
    with_db(&state, move |db| db.set_refresh_token(&user_id, None)).await?;

    info!("User {} logged out", current.user.username);

    Ok((
        cookies::clear_tokens(jar),
        Json(ApiResponse::new(200, Empty {}, "User logged out")),
    ))
}

/// POST /refresh-token: exchange the stored refresh token (cookie or JSON
/// body) for a new pair. The presented token is spent on success.
pub async fn refresh_token(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    // The cookie wins; the body is only consulted without one.
    let presented = match cookies::read(&jar, REFRESH_COOKIE) {
        Some(token) => token,
        None => refresh_token_from_body(&body)?
            .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?,
    };

    let claims = state.tokens.verify_refresh(&presented).map_err(|e| {
        warn!("Refresh token rejected: {}", e);
        ApiError::unauthorized("Invalid refresh token")
    })?;

    let user_id = claims.sub.to_string();
    let user = with_db(&state, move |db| db.find_user_by_id(&user_id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    if user.refresh_token.as_deref() != Some(presented.as_str()) {
        warn!("Stale refresh token presented for {}", user.id);
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    let pair = state.tokens.issue_pair(&user).map_err(|e| {
        error!("Token issuance failed for {}: {:#}", user.id, e);
        ApiError::internal("Something went wrong while generating access and refresh tokens")
    })?;

    // Compare-and-swap: a concurrent refresh that got here first wins.
    let (user_id, replacement) = (user.id.clone(), pair.refresh_token.clone());
    let rotated = with_db(&state, move |db| {
        db.rotate_refresh_token(&user_id, &presented, &replacement)
    })
    .await?;
    if !rotated {
        return Err(ApiError::unauthorized("Refresh token is expired or used"));
    }

    info!("Refreshed tokens for {}", user.username);

    let body = ApiResponse::new(200, pair.clone(), "Access token refreshed");
    Ok((cookies::set_tokens(jar, &pair), Json(body)))
}

fn refresh_token_from_body(body: &[u8]) -> Result<Option<String>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    let req = serde_json::from_slice::<RefreshRequest>(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON body: {}", e)))?;
    Ok(req.refresh_token.filter(|t| !t.is_empty()))
}
