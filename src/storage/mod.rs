use anyhow::Result;
use chrono::Utc;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use uuid::Uuid;

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow, serde::Serialize)]
pub struct MessageRow {
    pub id: String,
    pub thread_id: String,
    pub sender_id: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding
    /// it are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("courierd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                // Thread deletion cascades to membership + message rows.
                .foreign_keys(true)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            use sqlx::ConnectOptions as _;
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    /// Used to create the thread store and identity provider over the same
    /// SQLite connection.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        // participant_key is the canonical sorted encoding of the member
        // set; its UNIQUE constraint is the daemon's duplicate-thread guard.
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS threads (
                id TEXT PRIMARY KEY,
                participant_key TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS thread_participants (
                thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL REFERENCES users(id),
                PRIMARY KEY (thread_id, user_id)
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
                sender_id TEXT NOT NULL REFERENCES users(id),
                body TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_thread_participants_user
             ON thread_participants(user_id)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread_created
             ON messages(thread_id, created_at)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    // ─── Users ──────────────────────────────────────────────────────────────

    pub async fn create_user(&self, username: &str) -> Result<UserRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        sqlx::query("INSERT INTO users (id, username, created_at) VALUES (?, ?, ?)")
            .bind(&id)
            .bind(username)
            .bind(&now)
            .execute(&self.pool)
            .await?;
        self.get_user(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user not found after insert"))
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        Ok(sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn list_users(&self) -> Result<Vec<UserRow>> {
        with_timeout(async {
            Ok(sqlx::query_as("SELECT * FROM users ORDER BY created_at ASC")
                .fetch_all(&self.pool)
                .await?)
        })
        .await
    }

    // ─── Messages ───────────────────────────────────────────────────────────

    /// True if `user_id` is a member of `thread_id`.
    pub async fn is_participant(&self, thread_id: &str, user_id: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM thread_participants WHERE thread_id = ? AND user_id = ?",
        )
        .bind(thread_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Insert a message and touch the thread's `updated_at` atomically.
    pub async fn create_message(
        &self,
        thread_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<MessageRow> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO messages (id, thread_id, sender_id, body, is_read, created_at, updated_at)
             VALUES (?, ?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(thread_id)
        .bind(sender_id)
        .bind(body)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE threads SET updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        self.get_message(&id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("message not found after insert"))
    }

    pub async fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        Ok(sqlx::query_as("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Page of a thread's messages in insertion order (oldest first).
    pub async fn list_messages(
        &self,
        thread_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<MessageRow>> {
        with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM messages WHERE thread_id = ?
                 ORDER BY created_at ASC, id ASC LIMIT ? OFFSET ?",
            )
            .bind(thread_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?)
        })
        .await
    }

    pub async fn mark_message_read(&self, id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE messages SET is_read = 1, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Count of unread messages across every thread the user participates in.
    pub async fn unread_count(&self, user_id: &str) -> Result<u64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages m
             JOIN thread_participants tp ON tp.thread_id = m.thread_id
             WHERE tp.user_id = ? AND m.is_read = 0",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_storage() -> (Storage, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path()).await.unwrap();
        (storage, dir)
    }

    /// Insert a thread + membership directly; resolver-level behavior is
    /// covered elsewhere.
    async fn seed_thread(storage: &Storage, id: &str, users: &[&str]) {
        let now = Utc::now().to_rfc3339();
        let key: Vec<&str> = {
            let mut v = users.to_vec();
            v.sort_unstable();
            v
        };
        sqlx::query(
            "INSERT INTO threads (id, participant_key, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(key.join(":"))
        .bind(&now)
        .bind(&now)
        .execute(&storage.pool)
        .await
        .unwrap();
        for u in users {
            sqlx::query("INSERT INTO thread_participants (thread_id, user_id) VALUES (?, ?)")
                .bind(id)
                .bind(u)
                .execute(&storage.pool)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_users_roundtrip() {
        let (storage, _dir) = make_storage().await;
        let user = storage.create_user("alice").await.unwrap();
        assert_eq!(user.username, "alice");
        assert!(storage.get_user(&user.id).await.unwrap().is_some());
        assert_eq!(storage.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let (storage, _dir) = make_storage().await;
        storage.create_user("alice").await.unwrap();
        assert!(storage.create_user("alice").await.is_err());
    }

    #[tokio::test]
    async fn test_message_flow_and_unread_count() {
        let (storage, _dir) = make_storage().await;
        let a = storage.create_user("alice").await.unwrap();
        let b = storage.create_user("bob").await.unwrap();
        seed_thread(&storage, "t1", &[&a.id, &b.id]).await;

        let msg = storage.create_message("t1", &a.id, "hello").await.unwrap();
        assert!(!msg.is_read);
        assert_eq!(storage.unread_count(&b.id).await.unwrap(), 1);

        storage.mark_message_read(&msg.id).await.unwrap();
        assert_eq!(storage.unread_count(&b.id).await.unwrap(), 0);

        let page = storage.list_messages("t1", 10, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert!(page[0].is_read);
    }

    #[tokio::test]
    async fn test_pagination_window() {
        let (storage, _dir) = make_storage().await;
        let a = storage.create_user("alice").await.unwrap();
        let b = storage.create_user("bob").await.unwrap();
        seed_thread(&storage, "t1", &[&a.id, &b.id]).await;
        for i in 0..5 {
            storage
                .create_message("t1", &a.id, &format!("m{i}"))
                .await
                .unwrap();
        }
        let page = storage.list_messages("t1", 2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].body, "m2");
        assert_eq!(page[1].body, "m3");
    }

    #[tokio::test]
    async fn test_thread_delete_cascades_to_messages() {
        let (storage, _dir) = make_storage().await;
        let a = storage.create_user("alice").await.unwrap();
        let b = storage.create_user("bob").await.unwrap();
        seed_thread(&storage, "t1", &[&a.id, &b.id]).await;
        let msg = storage.create_message("t1", &a.id, "hello").await.unwrap();

        sqlx::query("DELETE FROM threads WHERE id = ?")
            .bind("t1")
            .execute(&storage.pool)
            .await
            .unwrap();
        assert!(storage.get_message(&msg.id).await.unwrap().is_none());
    }
}
