use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, patch, post},
};

use clipstream_media::MAX_IMAGE_SIZE;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{account, auth};

pub const USERS_PREFIX: &str = "/api/v1/users";

/// Two images plus text fields and multipart framing.
const MAX_BODY_SIZE: usize = 2 * MAX_IMAGE_SIZE + 64 * 1024;

/// The `/api/v1/users` route table. Public and protected routes share the
/// prefix; `require_auth` is a route layer so unknown paths still 404.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh-token", post(auth::refresh_token));

    let protected_routes = Router::new()
        .route("/testlogin", get(auth::test_login))
        .route("/logout", post(auth::logout))
        .route("/change-password", post(account::change_password))
        .route("/get-user", get(account::get_current_user))
        .route("/update-account", patch(account::update_account))
        .route("/avatar", patch(account::update_avatar))
        .route("/cover-image", patch(account::update_cover_image))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .nest(USERS_PREFIX, public_routes.merge(protected_routes))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}
