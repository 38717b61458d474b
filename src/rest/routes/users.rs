// rest/routes/users.rs — minimal user registry (identity leaf).
//
// No auth on create: provisioning belongs to the external identity layer in
// production; this surface exists so the service is usable standalone.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppContext;

type RouteError = (StatusCode, Json<Value>);

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
}

pub async fn create_user(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), RouteError> {
    let username = body.username.trim();
    if username.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "username must not be empty" })),
        ));
    }

    match ctx.storage.create_user(username).await {
        Ok(user) => Ok((StatusCode::CREATED, Json(json!(user)))),
        // UNIQUE(username) — report as a client conflict, not a 500.
        Err(e) if e.to_string().contains("UNIQUE constraint failed") => Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "username already taken" })),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

pub async fn list_users(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, RouteError> {
    let users = ctx.storage.list_users().await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(json!({ "users": users })))
}
