//! Request identity.
//!
//! Authentication itself is an external collaborator: an upstream gateway
//! terminates sessions and forwards the resolved identity in trusted
//! headers (`x-user-id`). This middleware only lifts those headers into an
//! [`AuthUser`] and rejects requests that lack them. Admin status comes
//! from server configuration, not from the request.

use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uuid::Uuid;

use crate::server::app::AppState;

/// Identity attached to every authenticated request.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub is_admin: bool,
}

/// Populate request extensions with the caller's identity, or reject.
pub async fn auth_middleware(
    Extension(state): Extension<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let user_id = request
        .headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok());

    let Some(user_id) = user_id else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": { "code": "unauthorized", "message": "missing or invalid identity" }
            })),
        )
            .into_response();
    };

    let auth_user = AuthUser {
        user_id,
        is_admin: state.deps.is_admin(user_id),
    };
    request.extensions_mut().insert(auth_user);

    next.run(request).await
}
