use axum_extra::extract::cookie::{Cookie, CookieJar};

use clipstream_types::api::TokenPair;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(true)
        .path("/")
        .build()
}

/// Set both token cookies on the response.
pub fn set_tokens(jar: CookieJar, pair: &TokenPair) -> CookieJar {
    jar.add(session_cookie(ACCESS_COOKIE, pair.access_token.clone()))
        .add(session_cookie(REFRESH_COOKIE, pair.refresh_token.clone()))
}

/// Expire both token cookies. Emitted unconditionally, even when the request
/// authenticated with a bearer header and carried no cookies.
pub fn clear_tokens(jar: CookieJar) -> CookieJar {
    let mut access = session_cookie(ACCESS_COOKIE, String::new());
    access.make_removal();
    let mut refresh = session_cookie(REFRESH_COOKIE, String::new());
    refresh.make_removal();
    jar.add(access).add(refresh)
}

/// Non-empty value of a cookie, if present.
pub fn read(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
