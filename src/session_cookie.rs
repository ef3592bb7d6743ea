use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::models::identifier::SessionIdentifier;

/// The browser cookie carrying the SSO session identifier.
pub const COOKIE_NAME: &str = "JSESSIONSSO";
/// The RFC 2109 cookie version the directory hands out. `Set-Cookie` (RFC 6265)
/// no longer serializes it.
pub const COOKIE_VERSION: u8 = 1;
/// "Remember me" lifetime: `i32::MAX` seconds, roughly 68 years.
pub const COOKIE_MAX_AGE_SECS: i64 = i32::MAX as i64;

/// Builds the SSO cookie for `identifier`.
///
/// The cookie is visible to every application under `domain` and is never
/// exposed to scripts. `domain` is `None` outside production.
pub fn build_cookie(identifier: &SessionIdentifier, domain: Option<&str>) -> Cookie<'static> {
    let mut cookie = Cookie::new(COOKIE_NAME, identifier.to_string());
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_path("/");
    cookie.set_max_age(Duration::seconds(COOKIE_MAX_AGE_SECS));
    if let Some(domain) = domain {
        cookie.set_domain(domain.to_string());
    }
    cookie
}

/// Re-issues the SSO cookie empty with a max age of zero.
pub fn clear_cookie(domain: Option<&str>) -> Cookie<'static> {
    let mut cookie = Cookie::new(COOKIE_NAME, "");
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_path("/");
    cookie.set_max_age(Duration::seconds(0));
    if let Some(domain) = domain {
        cookie.set_domain(domain.to_string());
    }
    cookie
}

/// Reads the session identifier from the request cookies.
///
/// A cookie whose value is not a valid identifier counts as absent.
pub fn find_session_identifier(cookies: &Cookies) -> Option<SessionIdentifier> {
    let cookie = cookies.get(COOKIE_NAME)?;
    match SessionIdentifier::parse(cookie.value()) {
        Ok(identifier) => Some(identifier),
        Err(_) => {
            tracing::debug!("⚠️  Ignoring malformed {} cookie", COOKIE_NAME);
            None
        }
    }
}
