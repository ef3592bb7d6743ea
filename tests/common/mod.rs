#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::{body::Body, response::Response, Router};
use http_body_util::BodyExt;
use tower_cookies::{Cookie, Cookies};

use sso_gate::config::Config;
use sso_gate::error::{AppError, Result};
use sso_gate::models::identifier::SessionIdentifier;
use sso_gate::models::principal::Principal;
use sso_gate::models::session::SessionRecord;
use sso_gate::repositories::directory::{DirectoryError, SessionDirectory};
use sso_gate::services::container::Container;
use sso_gate::services::realm::SIGN_IN_FAILED;

/// The cookie the fake container signs users in with.
pub const FAKE_LOGIN_COOKIE: &str = "fake_login";

/// A container with a fixed user table that counts its calls.
#[derive(Default)]
pub struct FakeContainer {
    users: HashMap<String, (String, Vec<String>)>,
    logins: AtomicUsize,
    logouts: AtomicUsize,
}

impl FakeContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, name: &str, password: &str, roles: &[&str]) -> Self {
        self.users.insert(
            name.to_string(),
            (
                password.to_string(),
                roles.iter().map(|r| r.to_string()).collect(),
            ),
        );
        self
    }

    pub fn login_count(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn logout_count(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Container for FakeContainer {
    async fn remote_user(&self, cookies: &Cookies) -> Option<Principal> {
        let name = cookies.get(FAKE_LOGIN_COOKIE)?.value().to_string();
        let (_, roles) = self.users.get(&name)?;
        Some(Principal::new(name, roles.clone()))
    }

    async fn login(&self, cookies: &Cookies, username: &str, password: &str) -> Result<Principal> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        match self.users.get(username) {
            Some((expected, roles)) if expected == password => {
                cookies.add(Cookie::new(FAKE_LOGIN_COOKIE, username.to_string()));
                Ok(Principal::new(username, roles.clone()))
            }
            _ => Err(AppError::Authentication(SIGN_IN_FAILED.to_string())),
        }
    }

    async fn logout(&self, cookies: &Cookies) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        cookies.remove(Cookie::new(FAKE_LOGIN_COOKIE, ""));
    }
}

/// A directory that never answers.
#[derive(Default)]
pub struct UnavailableDirectory {
    calls: AtomicUsize,
}

impl UnavailableDirectory {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> std::result::Result<T, DirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DirectoryError::Unavailable("connection refused".to_string()))
    }
}

#[async_trait]
impl SessionDirectory for UnavailableDirectory {
    async fn find_by_cookie(
        &self,
        _identifier: &SessionIdentifier,
    ) -> std::result::Result<Option<SessionRecord>, DirectoryError> {
        self.fail()
    }

    async fn find_by_consumer_key(
        &self,
        _consumer_key: &str,
    ) -> std::result::Result<Option<SessionRecord>, DirectoryError> {
        self.fail()
    }

    async fn create(
        &self,
        _principal_name: &str,
        _password: &str,
        _remote_address: Option<&str>,
    ) -> std::result::Result<SessionIdentifier, DirectoryError> {
        self.fail()
    }

    async fn refresh(&self, _record: &SessionRecord) -> std::result::Result<(), DirectoryError> {
        self.fail()
    }

    async fn clear(&self, _identifier: &SessionIdentifier) -> std::result::Result<(), DirectoryError> {
        self.fail()
    }

    async fn touch_last_seen(&self, _principal_name: &str) -> std::result::Result<(), DirectoryError> {
        self.fail()
    }
}

/// The configuration with every variable unset.
pub fn test_config() -> Config {
    Config::from_vars(|_| None).unwrap()
}

/// Reads a JSON response body.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Reads a response body as text.
pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Serves `router` on an ephemeral local port.
pub async fn spawn(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

/// A base URL nothing listens on.
pub fn closed_port_host() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

