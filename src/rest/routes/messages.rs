// rest/routes/messages.rs — message-scoped routes (read flag, unread count).

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::rest::auth::require_user;
use crate::AppContext;

type RouteError = (StatusCode, Json<Value>);

fn internal(e: impl std::fmt::Display) -> RouteError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

pub async fn mark_read(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, RouteError> {
    let user = require_user(&ctx, &headers).await?;

    let message = ctx
        .storage
        .get_message(&id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "message not found" })),
            )
        })?;

    let member = ctx
        .storage
        .is_participant(&message.thread_id, &user.id)
        .await
        .map_err(internal)?;
    if !member {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "not a participant of this thread" })),
        ));
    }

    ctx.storage.mark_message_read(&id).await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unread_count(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, RouteError> {
    let user = require_user(&ctx, &headers).await?;
    let count = ctx.storage.unread_count(&user.id).await.map_err(internal)?;
    Ok(Json(json!({ "unread": count })))
}
