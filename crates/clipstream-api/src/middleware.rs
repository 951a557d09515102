use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use clipstream_types::models::User;

use crate::cookies::{self, ACCESS_COOKIE};
use crate::error::ApiError;
use crate::state::{AppState, with_db};

/// The authenticated caller, inserted into request extensions by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub user: User,
}

/// Access token from the `accessToken` cookie, falling back to
/// `Authorization: Bearer`.
fn access_token(req: &Request) -> Option<String> {
    let jar = CookieJar::from_headers(req.headers());
    if let Some(token) = cookies::read(&jar, ACCESS_COOKIE) {
        return Some(token);
    }

    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Validate the access token and load the caller it names.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = access_token(&req).ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;

    let claims = state.tokens.verify_access(&token).map_err(|e| {
        debug!("Access token rejected: {}", e);
        ApiError::unauthorized("Invalid access token")
    })?;

    let user_id = claims.sub.to_string();
    let row = with_db(&state, move |db| db.find_user_by_id(&user_id))
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid access token"))?;

    req.extensions_mut().insert(CurrentUser {
        user: row.to_public()?,
        id: row.id,
    });
    Ok(next.run(req).await)
}
