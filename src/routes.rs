use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{
    handlers,
    handlers::api::ADMINISTRATOR_ROLE,
    middleware_layer::{
        authorization::{Annotations, ResourceInfo},
        auto_login::auto_login,
    },
    models::session::API_ROLE,
    state::AppState,
};

/// Builds the application router.
///
/// * `/api/auth/*` signs users in and out.
/// * `/portal/*` sits behind the auto-login filter.
/// * `/api/v1/*` is guarded per route by the authorization feature.
pub fn app(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/api/auth/sign-in", post(handlers::auth::sign_in))
        .route("/api/auth/sign-out", post(handlers::auth::sign_out))
        .with_state(state.clone());

    let portal_routes = Router::new()
        .route("/portal/whoami", get(handlers::portal::whoami))
        .route_layer(from_fn_with_state(state.auto_login.clone(), auto_login))
        .with_state(state.clone());

    let feature = state.authorization.clone();
    let api_class = Annotations::roles_allowed([API_ROLE, ADMINISTRATOR_ROLE]);

    let status = ResourceInfo::new("status")
        .class(api_class.clone())
        .method(Annotations::permit_all());
    let session = ResourceInfo::new("session").class(api_class.clone());
    let find_session = ResourceInfo::new("find_session")
        .class(api_class.clone())
        .method(Annotations::roles_allowed([ADMINISTRATOR_ROLE]));
    let clear_session = ResourceInfo::new("clear_session")
        .class(api_class)
        .method(Annotations::deny_all());

    let api_routes = Router::new()
        .route(
            "/api/v1/status",
            feature.secure(&status, get(handlers::api::status)),
        )
        .route(
            "/api/v1/session",
            feature.secure(&session, get(handlers::api::session)),
        )
        .route(
            "/api/v1/admin/sessions",
            feature
                .secure(&find_session, get(handlers::api::find_session))
                .merge(feature.secure(&clear_session, delete(handlers::api::clear_session))),
        )
        .with_state(state.clone());

    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    Router::new()
        .merge(auth_routes)
        .merge(portal_routes)
        .merge(api_routes)
        .route_service("/sign-in", ServeFile::new("static/sign-in.html"))
        .nest_service("/static", ServeDir::new("static"))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(cors)
}
