use axum::{
    extract::{Query, State},
    http::{Extensions, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    middleware_layer::oauth::OAuthSecurityContext,
    models::{identifier::SessionIdentifier, principal::Principal, session::SessionRecord},
    state::AppState,
};

/// The role administering directory sessions.
pub const ADMINISTRATOR_ROLE: &str = "ADMINISTRATOR";

/// The response payload for `GET /api/v1/status`.
#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// The caller as the authorization filter saw it.
#[derive(Serialize, Default)]
pub struct CallerResponse {
    pub principal: Option<String>,
    pub roles: Vec<String>,
    pub secure: bool,
    pub scheme: Option<&'static str>,
}

/// The query selecting a directory session.
#[derive(Deserialize, Debug)]
pub struct SessionQuery {
    pub uuid: String,
}

/// A directory session without its secret.
#[derive(Serialize)]
pub struct SessionView {
    pub uuid: String,
    pub user_name: String,
    pub remote_address: Option<String>,
    pub roles: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&SessionRecord> for SessionView {
    fn from(record: &SessionRecord) -> Self {
        Self {
            uuid: record.key().to_string(),
            user_name: record.principal_name().to_string(),
            remote_address: record.remote_address().map(str::to_string),
            roles: record.roles().iter().cloned().collect(),
            expires_at: record.expires_at(),
        }
    }
}

/// Open to anyone.
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Describes the caller.
///
/// The identity comes from the consumer key when one was resolved, else from
/// the container login.
pub async fn session(extensions: Extensions) -> Json<CallerResponse> {
    if let Some(context) = extensions.get::<OAuthSecurityContext>() {
        let principal = context.user_principal();
        return Json(CallerResponse {
            principal: Some(principal.name),
            roles: principal.roles.into_iter().collect(),
            secure: context.is_secure(),
            scheme: Some(context.authentication_scheme()),
        });
    }

    match extensions.get::<Principal>() {
        Some(principal) => Json(CallerResponse {
            principal: Some(principal.name.clone()),
            roles: principal.roles.iter().cloned().collect(),
            ..CallerResponse::default()
        }),
        None => Json(CallerResponse::default()),
    }
}

/// Looks up a directory session by identifier.
#[axum::debug_handler]
pub async fn find_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<Response> {
    let identifier = SessionIdentifier::parse(&query.uuid)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    match state.directory.find_by_cookie(&identifier).await? {
        Some(record) => Ok((StatusCode::OK, Json(SessionView::from(&record))).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: "Session not found",
            }),
        )
            .into_response()),
    }
}

/// Clears a directory session by identifier.
#[axum::debug_handler]
pub async fn clear_session(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<StatusCode> {
    let identifier = SessionIdentifier::parse(&query.uuid)
        .map_err(|e| AppError::Validation(e.to_string()))?;

    state.directory.clear(&identifier).await?;
    tracing::info!("🧹 Directory session cleared by API: {}", identifier);
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
}
