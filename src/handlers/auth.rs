use std::fmt;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Query, State},
    http::{Extensions, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tower_cookies::Cookies;

use crate::{
    error::Result,
    repositories::directory::touch_in_background,
    session_cookie,
    state::AppState,
    validation::auth::*,
};

/// The request payload for signing in.
#[derive(Deserialize)]
pub struct SignInRequest {
    pub username: String,
    pub password: String,
    /// Issue the SSO cookie so other applications sign the user in too.
    #[serde(default)]
    pub remember: bool,
}

impl fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignInRequest")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("remember", &self.remember)
            .finish()
    }
}

/// The query string of the sign-in request.
#[derive(Deserialize, Debug, Default)]
pub struct SignInQuery {
    pub referer: Option<String>,
}

/// The response payload for authentication-related requests.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
}

/// Finds the client address: the first `X-Forwarded-For` entry, else the
/// socket peer.
///
/// # Arguments
///
/// * `headers` - The request headers.
/// * `extensions` - The request extensions, holding the peer address when the
///   server was started with connect info.
///
/// # Returns
///
/// The address as a string, if known.
pub fn extract_remote_address(headers: &HeaderMap, extensions: &Extensions) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match forwarded {
        Some(address) => Some(address.to_string()),
        None => extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string()),
    }
}

/// Where to send the browser after signing in.
///
/// Only local paths are followed, and never back to the sign-in page.
pub fn redirect_after_sign_in(referer: Option<&str>, sign_in_page: &str) -> String {
    match referer.map(str::trim) {
        Some(referer)
            if referer.starts_with('/')
                && !referer.starts_with("//")
                && !referer.starts_with(sign_in_page) =>
        {
            referer.to_string()
        }
        _ => "/".to_string(),
    }
}

/// Handles signing in.
///
/// Any previous container login is ended first. With `remember`, the session
/// is also registered with the directory and the SSO cookie issued; a
/// directory failure there does not fail the sign in.
#[axum::debug_handler]
pub async fn sign_in(
    State(state): State<AppState>,
    cookies: Cookies,
    Query(query): Query<SignInQuery>,
    headers: HeaderMap,
    extensions: Extensions,
    Json(payload): Json<SignInRequest>,
) -> Result<Response> {
    tracing::info!("🔐 Sign in attempt - Payload: {:?}", payload);
    validate_username(&payload.username)?;
    validate_password(&payload.password)?;

    if state.container.remote_user(&cookies).await.is_some() {
        tracing::debug!("👋 Ending the previous login before signing in");
        state.container.logout(&cookies).await;
    }

    let principal = state
        .container
        .login(&cookies, &payload.username, &payload.password)
        .await?;

    touch_in_background(state.directory.clone(), principal.name.clone());

    if payload.remember {
        let remote_address = extract_remote_address(&headers, &extensions);

        match state
            .directory
            .create(&principal.name, &payload.password, remote_address.as_deref())
            .await
        {
            Ok(identifier) => {
                cookies.add(session_cookie::build_cookie(
                    &identifier,
                    state.config.cookie_domain(),
                ));
                tracing::info!("✅ SSO cookie issued for {}", principal.name);
            }
            Err(e) => {
                tracing::error!("❌ Failed to register SSO session for {}: {}", principal.name, e);
            }
        }
    }

    tracing::info!("✅ User signed in: {}", principal.name);

    let response = AuthResponse {
        success: true,
        message: "Sign in successful".to_string(),
        redirect: Some(redirect_after_sign_in(
            query.referer.as_deref(),
            &state.config.sign_in_page,
        )),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Handles signing out.
///
/// Clears the directory session, expires the SSO cookie and ends the
/// container login. Directory failures are logged and ignored.
#[axum::debug_handler]
pub async fn sign_out(State(state): State<AppState>, cookies: Cookies) -> Result<Response> {
    if let Some(identifier) = session_cookie::find_session_identifier(&cookies) {
        match state.directory.clear(&identifier).await {
            Ok(()) => tracing::info!("✅ SSO session cleared: {}", identifier),
            Err(e) => tracing::warn!("⚠️  Failed to clear SSO session {}: {}", identifier, e),
        }
    }

    cookies.add(session_cookie::clear_cookie(state.config.cookie_domain()));
    state.container.logout(&cookies).await;

    let response = AuthResponse {
        success: true,
        message: "Sign out successful".to_string(),
        redirect: Some(state.config.sign_in_page.clone()),
    };

    Ok((StatusCode::OK, Json(response)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn remote_address_prefers_the_first_forwarded_entry() {
        let mut headers = HeaderMap::new();
        let mut extensions = Extensions::new();
        assert_eq!(extract_remote_address(&headers, &extensions), None);

        extensions.insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 51000))));
        assert_eq!(
            extract_remote_address(&headers, &extensions).as_deref(),
            Some("10.0.0.9")
        );

        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.7, 10.0.0.1"));
        assert_eq!(
            extract_remote_address(&headers, &extensions).as_deref(),
            Some("203.0.113.7")
        );
    }

    #[test]
    fn redirects_only_to_local_pages() {
        assert_eq!(redirect_after_sign_in(Some("/portal/whoami?tab=1"), "/sign-in"), "/portal/whoami?tab=1");
        assert_eq!(redirect_after_sign_in(None, "/sign-in"), "/");
        assert_eq!(redirect_after_sign_in(Some(""), "/sign-in"), "/");
        assert_eq!(redirect_after_sign_in(Some("/sign-in?x=1"), "/sign-in"), "/");
        assert_eq!(redirect_after_sign_in(Some("https://evil.example"), "/sign-in"), "/");
        assert_eq!(redirect_after_sign_in(Some("//evil.example"), "/sign-in"), "/");
    }

    #[test]
    fn debug_output_hides_the_password() {
        let request = SignInRequest {
            username: "jesse@example.org".to_string(),
            password: "hunter2".to_string(),
            remember: true,
        };
        let debug = format!("{:?}", request);
        assert!(debug.contains("jesse@example.org"));
        assert!(!debug.contains("hunter2"));
    }
}
