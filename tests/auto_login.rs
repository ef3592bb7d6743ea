mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware::from_fn_with_state,
    routing::get,
    Extension, Router,
};
use tower::ServiceExt;
use tower_cookies::CookieManagerLayer;

use common::{body_json, body_text, FakeContainer, UnavailableDirectory, FAKE_LOGIN_COOKIE};
use sso_gate::crypto::cipher::CipherSuite;
use sso_gate::middleware_layer::auto_login::{auto_login, AutoLoginFilter};
use sso_gate::models::principal::Principal;
use sso_gate::models::session::{default_max_age, SessionRecord};
use sso_gate::repositories::directory::SessionDirectory;
use sso_gate::repositories::memory_directory::MemoryDirectory;
use sso_gate::session_cookie::COOKIE_NAME;

struct Portal {
    router: Router,
    hits: Arc<AtomicUsize>,
}

/// A single protected page that counts how often it is reached.
fn portal(directory: Arc<dyn SessionDirectory>, container: Arc<FakeContainer>) -> Portal {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    let filter = AutoLoginFilter::new(directory, container, CipherSuite::Sealed)
        .with_required_role(Some("PORTAL".to_string()));

    let router = Router::new()
        .route(
            "/portal/page",
            get(move |Extension(principal): Extension<Principal>| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    principal.name
                }
            }),
        )
        .route("/static/app.css", get(|| async { "body {}" }))
        .route_layer(from_fn_with_state(filter, auto_login))
        .layer(CookieManagerLayer::new());

    Portal { router, hits }
}

fn memory_directory() -> Arc<MemoryDirectory> {
    Arc::new(MemoryDirectory::new(CipherSuite::Sealed, default_max_age()))
}

fn get_with_cookie(uri: &str, cookie: Option<String>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn anonymous_without_cookie_is_redirected_with_the_requested_uri() {
    let container = Arc::new(FakeContainer::new());
    let portal = portal(memory_directory(), container.clone());

    let response = portal
        .router
        .oneshot(get_with_cookie("/portal/page?tab=2", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/sign-in?referer=%2Fportal%2Fpage%3Ftab%3D2"
    );
    assert_eq!(portal.hits.load(Ordering::SeqCst), 0);
    assert_eq!(container.login_count(), 0);
}

#[tokio::test]
async fn sso_cookie_signs_the_user_in() {
    let directory = memory_directory();
    let container = Arc::new(FakeContainer::new().with_user("jesse@example.org", "hunter2", &["PORTAL"]));
    let id = directory.create("jesse@example.org", "hunter2", None).await.unwrap();
    let portal = portal(directory.clone(), container.clone());

    let response = portal
        .router
        .oneshot(get_with_cookie("/portal/page", Some(format!("{}={}", COOKIE_NAME, id))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(set_cookie.starts_with(FAKE_LOGIN_COOKIE));
    assert_eq!(body_text(response).await, "jesse@example.org");
    assert_eq!(container.login_count(), 1);
    assert_eq!(portal.hits.load(Ordering::SeqCst), 1);

    // Last seen is updated on a detached task.
    let mut touched = false;
    for _ in 0..50 {
        if directory.last_seen("jesse@example.org").await.is_some() {
            touched = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(touched);
}

#[tokio::test]
async fn missing_role_is_forbidden_and_logged_out() {
    let directory = memory_directory();
    let container = Arc::new(FakeContainer::new().with_user("guest@example.org", "hunter2", &["GUEST"]));
    let id = directory.create("guest@example.org", "hunter2", None).await.unwrap();
    let portal = portal(directory, container.clone());

    let response = portal
        .router
        .oneshot(get_with_cookie("/portal/page", Some(format!("{}={}", COOKIE_NAME, id))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Forbidden");
    assert_eq!(portal.hits.load(Ordering::SeqCst), 0);
    assert_eq!(container.login_count(), 1);
    assert_eq!(container.logout_count(), 1);
}

#[tokio::test]
async fn directory_outage_redirects_without_a_login_attempt() {
    let directory = Arc::new(UnavailableDirectory::default());
    let container = Arc::new(FakeContainer::new().with_user("jesse@example.org", "hunter2", &["PORTAL"]));
    let portal = portal(directory.clone(), container.clone());

    let response = portal
        .router
        .oneshot(get_with_cookie(
            "/portal/page",
            Some(format!("{}=550e8400-e29b-41d4-a716-446655440000", COOKIE_NAME)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(directory.call_count(), 1);
    assert_eq!(container.login_count(), 0);
    assert_eq!(portal.hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_or_expired_sessions_redirect() {
    let directory = memory_directory();
    let container = Arc::new(FakeContainer::new().with_user("jesse@example.org", "hunter2", &["PORTAL"]));

    let expired = SessionRecord::new("jesse@example.org", Some("hunter2"), &CipherSuite::Sealed, default_max_age())
        .unwrap()
        .with_expiry(Some(chrono::Utc::now() - chrono::Duration::minutes(1)));
    let expired_id = expired.identifier().unwrap().clone();
    directory.insert(expired).await;

    for cookie in [
        format!("{}={}", COOKIE_NAME, expired_id),
        format!("{}=550e8400-e29b-41d4-a716-446655440000", COOKIE_NAME),
        format!("{}=not-a-uuid", COOKIE_NAME),
    ] {
        let portal = portal(directory.clone(), container.clone());
        let response = portal
            .router
            .oneshot(get_with_cookie("/portal/page", Some(cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
    }
    assert_eq!(container.login_count(), 0);
}

#[tokio::test]
async fn wrong_password_in_the_directory_redirects() {
    let directory = memory_directory();
    let container = Arc::new(FakeContainer::new().with_user("jesse@example.org", "hunter2", &["PORTAL"]));
    let id = directory.create("jesse@example.org", "stale-password", None).await.unwrap();
    let portal = portal(directory, container.clone());

    let response = portal
        .router
        .oneshot(get_with_cookie("/portal/page", Some(format!("{}={}", COOKIE_NAME, id))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(container.login_count(), 1);
    assert_eq!(container.logout_count(), 0);
}

#[tokio::test]
async fn existing_container_login_only_rechecks_the_role() {
    let directory = Arc::new(UnavailableDirectory::default());
    let container = Arc::new(
        FakeContainer::new()
            .with_user("jesse@example.org", "hunter2", &["PORTAL"])
            .with_user("guest@example.org", "hunter2", &["GUEST"]),
    );

    let portal_a = portal(directory.clone(), container.clone());
    let response = portal_a
        .router
        .oneshot(get_with_cookie(
            "/portal/page",
            Some(format!("{}=jesse@example.org", FAKE_LOGIN_COOKIE)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(portal_a.hits.load(Ordering::SeqCst), 1);

    let portal_b = portal(directory.clone(), container.clone());
    let response = portal_b
        .router
        .oneshot(get_with_cookie(
            "/portal/page",
            Some(format!("{}=guest@example.org", FAKE_LOGIN_COOKIE)),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(portal_b.hits.load(Ordering::SeqCst), 0);

    assert_eq!(directory.call_count(), 0);
    assert_eq!(container.login_count(), 0);
    assert_eq!(container.logout_count(), 0);
}

#[tokio::test]
async fn excluded_paths_skip_the_filter() {
    let container = Arc::new(FakeContainer::new());
    let portal = portal(memory_directory(), container);

    let response = portal
        .router
        .oneshot(get_with_cookie("/static/app.css", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "body {}");
}
