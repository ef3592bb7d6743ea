use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_cookies::Cookies;

use crate::crypto::cipher::CipherSuite;
use crate::error::AppError;
use crate::models::identifier::SessionIdentifier;
use crate::models::principal::Principal;
use crate::models::session::SessionRecord;
use crate::repositories::directory::{touch_in_background, SessionDirectory};
use crate::services::container::Container;
use crate::session_cookie;

/// Paths served without any login check.
pub const DEFAULT_EXCLUDED_PREFIXES: &[&str] = &["/static/"];

/// Where an anonymous browser is sent.
pub const DEFAULT_SIGN_IN_PAGE: &str = "/sign-in";

/// The progress of a browser request through the auto-login filter.
///
/// `AuthenticatedInRole`, `Rejected` and `Redirected` are terminal.
#[derive(Debug)]
pub enum LoginState {
    Anonymous,
    CookiePresent(SessionIdentifier),
    Resolved(SessionRecord),
    AuthenticatedInRole(Principal),
    Rejected,
    Redirected(String),
}

/// Turns a `JSESSIONSSO` cookie into a container login.
#[derive(Clone)]
pub struct AutoLoginFilter {
    directory: Arc<dyn SessionDirectory>,
    container: Arc<dyn Container>,
    cipher: CipherSuite,
    required_role: Option<String>,
    sign_in_page: String,
    excluded_prefixes: Vec<String>,
}

impl AutoLoginFilter {
    /// Creates a filter with no required role, the default sign-in page and
    /// the default exclusions.
    pub fn new(
        directory: Arc<dyn SessionDirectory>,
        container: Arc<dyn Container>,
        cipher: CipherSuite,
    ) -> Self {
        Self {
            directory,
            container,
            cipher,
            required_role: None,
            sign_in_page: DEFAULT_SIGN_IN_PAGE.to_string(),
            excluded_prefixes: DEFAULT_EXCLUDED_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
        }
    }

    pub fn with_required_role(mut self, role: Option<String>) -> Self {
        self.required_role = role.filter(|role| !role.is_empty());
        self
    }

    pub fn with_sign_in_page(mut self, sign_in_page: impl Into<String>) -> Self {
        self.sign_in_page = sign_in_page.into();
        self
    }

    pub fn with_excluded_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.excluded_prefixes = prefixes;
        self
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }

    /// The sign-in page, carrying the requested path and query as `referer`.
    pub fn redirect_location(&self, uri: &Uri) -> String {
        let requested = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| uri.path());
        let separator = if self.sign_in_page.contains('?') { '&' } else { '?' };
        format!(
            "{}{}referer={}",
            self.sign_in_page,
            separator,
            urlencoding::encode(requested)
        )
    }

    fn has_required_role(&self, principal: &Principal) -> bool {
        match &self.required_role {
            Some(role) => principal.is_user_in_role(role),
            None => true,
        }
    }

    /// Drives a request to a terminal [`LoginState`].
    pub async fn run(&self, cookies: &Cookies, uri: &Uri) -> LoginState {
        let mut state = self.enter(cookies).await;

        loop {
            state = match state {
                LoginState::Anonymous => match session_cookie::find_session_identifier(cookies) {
                    Some(identifier) => LoginState::CookiePresent(identifier),
                    None => {
                        tracing::debug!("🍪 No SSO cookie, redirecting to sign in");
                        LoginState::Redirected(self.redirect_location(uri))
                    }
                },
                LoginState::CookiePresent(identifier) => self.resolve(&identifier, uri).await,
                LoginState::Resolved(record) => self.login(cookies, record, uri).await,
                terminal => return terminal,
            };
        }
    }

    async fn enter(&self, cookies: &Cookies) -> LoginState {
        match self.container.remote_user(cookies).await {
            Some(principal) if self.has_required_role(&principal) => {
                LoginState::AuthenticatedInRole(principal)
            }
            Some(principal) => {
                tracing::warn!("⛔ {} lacks the required role", principal.name);
                LoginState::Rejected
            }
            None => LoginState::Anonymous,
        }
    }

    async fn resolve(&self, identifier: &SessionIdentifier, uri: &Uri) -> LoginState {
        match self.directory.find_by_cookie(identifier).await {
            Ok(Some(record)) if record.is_expired() => {
                tracing::debug!("⌛ SSO session {} expired", identifier);
                LoginState::Redirected(self.redirect_location(uri))
            }
            Ok(Some(record)) => LoginState::Resolved(record),
            Ok(None) => {
                tracing::debug!("🔎 SSO session {} not found", identifier);
                LoginState::Redirected(self.redirect_location(uri))
            }
            Err(e) => {
                tracing::error!("❌ SSO cookie lookup failed: {}", e);
                LoginState::Redirected(self.redirect_location(uri))
            }
        }
    }

    async fn login(&self, cookies: &Cookies, record: SessionRecord, uri: &Uri) -> LoginState {
        let Some(password) = record.password(&self.cipher) else {
            tracing::debug!("SSO session {} carries no usable password", record);
            return LoginState::Redirected(self.redirect_location(uri));
        };

        let principal = match self
            .container
            .login(cookies, record.principal_name(), &password)
            .await
        {
            Ok(principal) => principal,
            Err(e) => {
                tracing::warn!("⚠️  SSO login failed for {}: {}", record.principal_name(), e);
                return LoginState::Redirected(self.redirect_location(uri));
            }
        };

        if !self.has_required_role(&principal) {
            tracing::warn!("⛔ {} signed in without the required role", principal.name);
            self.container.logout(cookies).await;
            return LoginState::Rejected;
        }

        touch_in_background(self.directory.clone(), principal.name.clone());
        tracing::info!("✅ SSO login for {}", principal.name);
        LoginState::AuthenticatedInRole(principal)
    }
}

/// The middleware running an [`AutoLoginFilter`] in front of browser pages.
///
/// # Returns
///
/// The downstream response with the [`Principal`] in the request extensions,
/// a `302 Found` to the sign-in page, or `403 Forbidden`.
pub async fn auto_login(
    State(filter): State<AutoLoginFilter>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if filter.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    match filter.run(&cookies, request.uri()).await {
        LoginState::AuthenticatedInRole(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        LoginState::Redirected(location) => {
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        _ => AppError::Forbidden.into_response(),
    }
}
