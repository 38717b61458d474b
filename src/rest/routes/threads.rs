// rest/routes/threads.rs — thread resolution + thread-scoped message routes.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::rest::auth::require_user;
use crate::threads::Thread;
use crate::AppContext;

type RouteError = (StatusCode, Json<Value>);

fn internal(e: impl std::fmt::Display) -> RouteError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

fn thread_json(t: &Thread) -> Value {
    json!({
        "id": t.id,
        "participants": t.participants,
        "created_at": t.created_at,
        "updated_at": t.updated_at,
    })
}

#[derive(Deserialize)]
pub struct ResolveThreadRequest {
    /// The other members of the thread; the requester is always implied.
    pub participant_ids: Vec<String>,
}

/// Resolve-or-create the thread for `{requester} ∪ participant_ids`.
///
/// 201 with the thread when this call created it, 200 when it already
/// existed — the caller distinguishes the outcomes by status alone.
pub async fn resolve_thread(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<ResolveThreadRequest>,
) -> Result<(StatusCode, Json<Value>), RouteError> {
    let user = require_user(&ctx, &headers).await?;

    match ctx.resolver.resolve(&user.id, &body.participant_ids).await {
        Ok(res) => {
            let status = if res.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            Ok((status, Json(thread_json(&res.thread))))
        }
        Err(e) if e.is_client_error() => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )),
        Err(e) => Err(internal(e)),
    }
}

pub async fn list_threads(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, RouteError> {
    let user = require_user(&ctx, &headers).await?;
    let threads = ctx
        .thread_store
        .list_for_user(&user.id)
        .await
        .map_err(internal)?;
    let list: Vec<Value> = threads.iter().map(thread_json).collect();
    Ok(Json(json!({ "threads": list })))
}

/// Load a thread and check the requester belongs to it.
async fn participant_thread(
    ctx: &AppContext,
    thread_id: &str,
    user_id: &str,
) -> Result<Thread, RouteError> {
    let thread = ctx
        .thread_store
        .get(thread_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": "thread not found" })),
            )
        })?;
    if !thread.has_participant(user_id) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "not a participant of this thread" })),
        ));
    }
    Ok(thread)
}

pub async fn get_thread(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, RouteError> {
    let user = require_user(&ctx, &headers).await?;
    let thread = participant_thread(&ctx, &id, &user.id).await?;
    Ok(Json(thread_json(&thread)))
}

pub async fn delete_thread(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, RouteError> {
    let user = require_user(&ctx, &headers).await?;
    participant_thread(&ctx, &id, &user.id).await?;
    ctx.thread_store.delete(&id).await.map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize, Default)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn list_thread_messages(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Query(page): Query<PageParams>,
) -> Result<Json<Value>, RouteError> {
    let user = require_user(&ctx, &headers).await?;
    participant_thread(&ctx, &id, &user.id).await?;

    let max = ctx.config.message_page_limit;
    let limit = page.limit.unwrap_or(max).clamp(1, max);
    let offset = page.offset.unwrap_or(0).max(0);

    let messages = ctx
        .storage
        .list_messages(&id, limit, offset)
        .await
        .map_err(internal)?;
    Ok(Json(json!({
        "messages": messages,
        "limit": limit,
        "offset": offset,
    })))
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    pub body: String,
}

pub async fn send_message(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Value>), RouteError> {
    let user = require_user(&ctx, &headers).await?;
    participant_thread(&ctx, &id, &user.id).await?;

    if body.body.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "message body must not be empty" })),
        ));
    }

    let message = ctx
        .storage
        .create_message(&id, &user.id, &body.body)
        .await
        .map_err(internal)?;
    Ok((StatusCode::CREATED, Json(json!(message))))
}
