//! End-to-end REST tests: spins up a real server on a free port and walks
//! the resolve/messaging scenario over HTTP.

use std::sync::Arc;

use courierd::{config::DaemonConfig, rest, storage::Storage, AppContext};
use serde_json::{json, Value};

/// Start a daemon on a random port and return its base URL.
async fn start_test_server() -> (String, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(DaemonConfig::new(
        None,
        Some(dir.path().to_path_buf()),
        Some("warn".to_string()),
        None,
        None,
    ));
    let storage = Arc::new(Storage::new(dir.path()).await.unwrap());
    let ctx = Arc::new(AppContext::new(config, storage));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = rest::build_router(ctx);
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    (format!("http://{addr}/api/v1"), dir)
}

async fn create_user(client: &reqwest::Client, base: &str, username: &str) -> String {
    let resp = client
        .post(format!("{base}/users"))
        .json(&json!({ "username": username }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn health_reports_ok() {
    let (base, _dir) = start_test_server().await;
    let resp = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn missing_identity_header_is_unauthorized() {
    let (base, _dir) = start_test_server().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{base}/threads"))
        .json(&json!({ "participant_ids": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

/// The scenario from the service contract: create/find with distinct
/// statuses, then the two rejection cases.
#[tokio::test]
async fn thread_resolution_scenario() {
    let (base, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let u1 = create_user(&client, &base, "u1").await;
    let u2 = create_user(&client, &base, "u2").await;
    let u3 = create_user(&client, &base, "u3").await;

    // U1 + [U2] → 201 created.
    let resp = client
        .post(format!("{base}/threads"))
        .header("x-user-id", &u1)
        .json(&json!({ "participant_ids": [u2] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let t1: Value = resp.json().await.unwrap();
    let t1_id = t1["id"].as_str().unwrap().to_string();

    // U2 + [U1] → 200 found, same thread.
    let resp = client
        .post(format!("{base}/threads"))
        .header("x-user-id", &u2)
        .json(&json!({ "participant_ids": [u1] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let found: Value = resp.json().await.unwrap();
    assert_eq!(found["id"].as_str().unwrap(), t1_id);

    // Three distinct ids → invalid participant count.
    let resp = client
        .post(format!("{base}/threads"))
        .header("x-user-id", &u1)
        .json(&json!({ "participant_ids": [u2, u3] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Nonexistent id → unknown participant.
    let resp = client
        .post(format!("{base}/threads"))
        .header("x-user-id", &u1)
        .json(&json!({ "participant_ids": ["9999"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let err: Value = resp.json().await.unwrap();
    assert!(err["error"].as_str().unwrap().contains("9999"));
}

#[tokio::test]
async fn messaging_flow_over_http() {
    let (base, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let alice = create_user(&client, &base, "alice").await;
    let bob = create_user(&client, &base, "bob").await;
    let eve = create_user(&client, &base, "eve").await;

    let resp = client
        .post(format!("{base}/threads"))
        .header("x-user-id", &alice)
        .json(&json!({ "participant_ids": [bob] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let thread: Value = resp.json().await.unwrap();
    let thread_id = thread["id"].as_str().unwrap().to_string();

    // Alice sends a message.
    let resp = client
        .post(format!("{base}/threads/{thread_id}/messages"))
        .header("x-user-id", &alice)
        .json(&json!({ "body": "hello bob" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let message: Value = resp.json().await.unwrap();
    let message_id = message["id"].as_str().unwrap().to_string();

    // Eve is not a participant — no reading, no writing.
    let resp = client
        .get(format!("{base}/threads/{thread_id}/messages"))
        .header("x-user-id", &eve)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let resp = client
        .post(format!("{base}/threads/{thread_id}/messages"))
        .header("x-user-id", &eve)
        .json(&json!({ "body": "let me in" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Bob lists messages and sees one unread.
    let resp = client
        .get(format!("{base}/threads/{thread_id}/messages"))
        .header("x-user-id", &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["messages"].as_array().unwrap().len(), 1);

    let resp = client
        .get(format!("{base}/messages/unread-count"))
        .header("x-user-id", &bob)
        .send()
        .await
        .unwrap();
    let count: Value = resp.json().await.unwrap();
    assert_eq!(count["unread"], 1);

    // Bob marks it read.
    let resp = client
        .post(format!("{base}/messages/{message_id}/read"))
        .header("x-user-id", &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{base}/messages/unread-count"))
        .header("x-user-id", &bob)
        .send()
        .await
        .unwrap();
    let count: Value = resp.json().await.unwrap();
    assert_eq!(count["unread"], 0);

    // Bob's thread list contains the thread; deleting it removes messages.
    let resp = client
        .get(format!("{base}/threads"))
        .header("x-user-id", &bob)
        .send()
        .await
        .unwrap();
    let threads: Value = resp.json().await.unwrap();
    assert_eq!(threads["threads"].as_array().unwrap().len(), 1);

    let resp = client
        .delete(format!("{base}/threads/{thread_id}"))
        .header("x-user-id", &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{base}/threads/{thread_id}"))
        .header("x-user-id", &bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}
