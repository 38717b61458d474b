// rest/auth.rs — requester identity extraction.
//
// Authentication proper (tokens, sessions) lives outside the daemon; a
// trusted front layer forwards the caller's user id in `x-user-id`. We only
// verify the id resolves to a real user.

use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::storage::UserRow;
use crate::AppContext;

pub type AuthError = (StatusCode, Json<Value>);

/// Resolve the requester from the `x-user-id` header, or reject with 401.
pub async fn require_user(ctx: &AppContext, headers: &HeaderMap) -> Result<UserRow, AuthError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "missing x-user-id header" })),
            )
        })?;

    match ctx.storage.get_user(user_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unknown user" })),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}
