use std::sync::Arc;

use async_trait::async_trait;
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::principal::Principal;
use crate::services::login_sessions::{LoginSession, LoginSessionStore};
use crate::services::realm::FileRealm;

/// The cookie carrying the container's own login session.
pub const LOGIN_COOKIE_NAME: &str = "session_id";

/// The hosting application's login mechanism.
///
/// The SSO layer only ever asks it who is signed in, signs a user in with a
/// user name and password, or signs the current user out.
#[async_trait]
pub trait Container: Send + Sync {
    /// The principal of the current login session, if any.
    async fn remote_user(&self, cookies: &Cookies) -> Option<Principal>;

    /// Authenticates against the realm and opens a login session.
    async fn login(&self, cookies: &Cookies, username: &str, password: &str) -> Result<Principal>;

    /// Ends the current login session. Does nothing when nobody is signed in.
    async fn logout(&self, cookies: &Cookies);
}

/// A [`Container`] backed by a [`FileRealm`] and a [`LoginSessionStore`].
#[derive(Clone)]
pub struct RealmContainer {
    realm: Arc<FileRealm>,
    sessions: Arc<dyn LoginSessionStore>,
    session_duration_days: i64,
    secure_cookies: bool,
}

impl RealmContainer {
    /// Creates a new `RealmContainer`.
    ///
    /// # Arguments
    ///
    /// * `realm` - The users allowed to sign in.
    /// * `sessions` - Where login sessions are kept.
    /// * `session_duration_days` - How long a login session lasts.
    /// * `secure_cookies` - Whether the login cookie is restricted to HTTPS.
    pub fn new(
        realm: Arc<FileRealm>,
        sessions: Arc<dyn LoginSessionStore>,
        session_duration_days: i64,
        secure_cookies: bool,
    ) -> Self {
        Self {
            realm,
            sessions,
            session_duration_days,
            secure_cookies,
        }
    }

    fn login_cookie(&self, value: String, max_age_secs: i64) -> Cookie<'static> {
        let mut cookie = Cookie::new(LOGIN_COOKIE_NAME, value);
        cookie.set_http_only(true);
        if self.secure_cookies {
            cookie.set_secure(true);
        }
        cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
        cookie.set_max_age(Duration::seconds(max_age_secs));
        cookie.set_path("/");
        cookie
    }
}

fn login_session_id(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get(LOGIN_COOKIE_NAME)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

#[async_trait]
impl Container for RealmContainer {
    async fn remote_user(&self, cookies: &Cookies) -> Option<Principal> {
        let session_id = login_session_id(cookies)?;

        match self.sessions.get(&session_id).await {
            Ok(session) => session.map(|session| session.principal),
            Err(e) => {
                tracing::warn!("⚠️  Login session lookup failed: {}", e);
                None
            }
        }
    }

    async fn login(&self, cookies: &Cookies, username: &str, password: &str) -> Result<Principal> {
        let realm = self.realm.clone();
        let username_owned = username.to_string();
        let password_owned = zeroize::Zeroizing::new(password.to_string());

        // Argon2 verification is CPU bound.
        let principal = tokio::task::spawn_blocking(move || {
            realm.authenticate(&username_owned, &password_owned)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Authentication task failed: {}", e)))??;

        let session_id = Uuid::new_v4();
        let session = LoginSession::open(
            principal.clone(),
            chrono::Duration::days(self.session_duration_days),
        );
        self.sessions.put(&session_id, &session).await?;

        cookies.add(self.login_cookie(
            session_id.to_string(),
            self.session_duration_days * 86400,
        ));

        tracing::info!("✅ Container login for {}", principal.name);
        Ok(principal)
    }

    async fn logout(&self, cookies: &Cookies) {
        let Some(session_id) = login_session_id(cookies) else {
            return;
        };

        if let Err(e) = self.sessions.remove(&session_id).await {
            tracing::warn!("⚠️  Failed to delete login session {}: {}", session_id, e);
        }
        cookies.remove(self.login_cookie(String::new(), 0));

        tracing::info!("👋 Container logout: session {}", session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::login_sessions::MemoryLoginSessions;
    use crate::services::realm::{hash_password, RealmUser};

    fn container() -> RealmContainer {
        let realm = FileRealm::from_users(vec![RealmUser {
            username: "jesse@example.org".to_string(),
            password_hash: hash_password("hunter2").unwrap(),
            roles: vec!["PORTAL".to_string()],
            is_active: true,
        }]);
        RealmContainer::new(
            Arc::new(realm),
            Arc::new(MemoryLoginSessions::new()),
            7,
            false,
        )
    }

    #[tokio::test]
    async fn login_opens_a_session_visible_to_remote_user() {
        let container = container();
        let cookies = Cookies::default();

        assert!(container.remote_user(&cookies).await.is_none());

        let principal = container.login(&cookies, "jesse@example.org", "hunter2").await.unwrap();
        assert!(principal.is_user_in_role("PORTAL"));

        let cookie = cookies.get(LOGIN_COOKIE_NAME).unwrap();
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(
            container.remote_user(&cookies).await.map(|p| p.name),
            Some("jesse@example.org".to_string())
        );

        container.logout(&cookies).await;
        assert!(container.remote_user(&cookies).await.is_none());
    }

    #[tokio::test]
    async fn failed_login_sets_no_cookie() {
        let container = container();
        let cookies = Cookies::default();

        let result = container.login(&cookies, "jesse@example.org", "wrong").await;
        assert!(matches!(result, Err(AppError::Authentication(_))));
        assert!(cookies.get(LOGIN_COOKIE_NAME).is_none());
    }
}
