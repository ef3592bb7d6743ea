use axum::{Extension, Json};
use serde::Serialize;

use crate::models::principal::Principal;

/// The signed-in user as shown to the portal.
#[derive(Serialize)]
pub struct WhoAmIResponse {
    pub name: String,
    pub roles: Vec<String>,
}

/// Returns the user the auto-login filter admitted.
#[axum::debug_handler]
pub async fn whoami(Extension(principal): Extension<Principal>) -> Json<WhoAmIResponse> {
    tracing::debug!("🙋 whoami for {}", principal.name);

    Json(WhoAmIResponse {
        name: principal.name,
        roles: principal.roles.into_iter().collect(),
    })
}
