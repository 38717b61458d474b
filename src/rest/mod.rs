// rest/mod.rs — Public REST API server.
//
// Axum HTTP server, local only by default. The requester's identity comes
// from the `x-user-id` header, standing in for the external authenticated
// session layer.
//
// Endpoints:
//   POST /api/v1/threads                     (resolve-or-create: 201 created / 200 found)
//   GET  /api/v1/threads
//   GET  /api/v1/threads/{id}
//   DELETE /api/v1/threads/{id}
//   GET  /api/v1/threads/{id}/messages
//   POST /api/v1/threads/{id}/messages
//   POST /api/v1/messages/{id}/read
//   GET  /api/v1/messages/unread-count
//   POST /api/v1/users
//   GET  /api/v1/users
//   GET  /api/v1/health

pub mod auth;
pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Health (no auth)
        .route("/api/v1/health", get(routes::health::health))
        // Threads
        .route(
            "/api/v1/threads",
            get(routes::threads::list_threads).post(routes::threads::resolve_thread),
        )
        .route(
            "/api/v1/threads/{id}",
            get(routes::threads::get_thread).delete(routes::threads::delete_thread),
        )
        .route(
            "/api/v1/threads/{id}/messages",
            get(routes::threads::list_thread_messages).post(routes::threads::send_message),
        )
        // Messages
        .route(
            "/api/v1/messages/{id}/read",
            post(routes::messages::mark_read),
        )
        .route(
            "/api/v1/messages/unread-count",
            get(routes::messages::unread_count),
        )
        // Users (identity leaf)
        .route(
            "/api/v1/users",
            get(routes::users::list_users).post(routes::users::create_user),
        )
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
