//! Durable thread storage contract and its SQLite implementation.
//!
//! The store is where the uniqueness invariant is actually enforced:
//! `create` writes the thread row and its membership rows in one
//! transaction, and the UNIQUE constraint on the canonical
//! `participant_key` turns a concurrent duplicate create into a
//! distinguishable [`CreateError::AlreadyExists`] for the losing writer.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::model::{participant_key, Thread};

/// Failure modes of [`ThreadStore::create`].
#[derive(Debug, thiserror::Error)]
pub enum CreateError {
    /// A thread with the same participant set already exists — the caller
    /// lost a creation race and should re-read instead of failing.
    #[error("thread already exists for this participant set")]
    AlreadyExists,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// Storage contract used by the resolver.
///
/// `find_candidates` is a deliberate over-approximation (any membership
/// overlap); exact set matching happens in the resolver because SQLite has
/// no native "set equals" predicate we can index on — the UNIQUE
/// participant_key covers the write side instead.
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Threads having at least one of the given participants.
    async fn find_candidates(&self, participants: &BTreeSet<String>) -> anyhow::Result<Vec<Thread>>;

    /// The full participant set of one thread.
    async fn participants(&self, thread_id: &str) -> anyhow::Result<BTreeSet<String>>;

    /// Create a thread with exactly this participant set, atomically.
    async fn create(&self, participants: &BTreeSet<String>) -> Result<Thread, CreateError>;
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ThreadRow {
    id: String,
    created_at: String,
    updated_at: String,
}

/// SQLite-backed [`ThreadStore`] sharing the daemon's connection pool.
#[derive(Clone)]
pub struct SqliteThreadStore {
    pool: SqlitePool,
}

impl SqliteThreadStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn load(&self, row: ThreadRow) -> anyhow::Result<Thread> {
        let participants = self.participants(&row.id).await?;
        Ok(Thread {
            id: row.id,
            participants: participants.into_iter().collect(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Fetch a single thread by id.
    pub async fn get(&self, thread_id: &str) -> anyhow::Result<Option<Thread>> {
        let row: Option<ThreadRow> =
            sqlx::query_as("SELECT id, created_at, updated_at FROM threads WHERE id = ?")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some(row) => Ok(Some(self.load(row).await?)),
            None => Ok(None),
        }
    }

    /// All threads the given user participates in, most recently updated first.
    pub async fn list_for_user(&self, user_id: &str) -> anyhow::Result<Vec<Thread>> {
        let rows: Vec<ThreadRow> = sqlx::query_as(
            "SELECT t.id, t.created_at, t.updated_at FROM threads t
             JOIN thread_participants tp ON tp.thread_id = t.id
             WHERE tp.user_id = ?
             ORDER BY t.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        let mut threads = Vec::with_capacity(rows.len());
        for row in rows {
            threads.push(self.load(row).await?);
        }
        Ok(threads)
    }

    /// Delete a thread. Messages and membership rows cascade at the schema level.
    pub async fn delete(&self, thread_id: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM threads WHERE id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ThreadStore for SqliteThreadStore {
    async fn find_candidates(&self, participants: &BTreeSet<String>) -> anyhow::Result<Vec<Thread>> {
        // Dynamic IN-list; participant sets are tiny (N is 2 by default).
        let placeholders = vec!["?"; participants.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT t.id, t.created_at, t.updated_at FROM threads t
             JOIN thread_participants tp ON tp.thread_id = t.id
             WHERE tp.user_id IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, ThreadRow>(&sql);
        for id in participants {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        let mut threads = Vec::with_capacity(rows.len());
        for row in rows {
            threads.push(self.load(row).await?);
        }
        Ok(threads)
    }

    async fn participants(&self, thread_id: &str) -> anyhow::Result<BTreeSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT user_id FROM thread_participants WHERE thread_id = ?")
                .bind(thread_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn create(&self, participants: &BTreeSet<String>) -> Result<Thread, CreateError> {
        let id = Uuid::new_v4().to_string();
        let key = participant_key(participants);
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;
        let inserted = sqlx::query(
            "INSERT INTO threads (id, participant_key, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&key)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await;

        if let Err(e) = inserted {
            // The UNIQUE participant_key fired: a concurrent create won.
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return Err(CreateError::AlreadyExists);
                }
            }
            return Err(CreateError::Store(e.into()));
        }

        for user_id in participants {
            sqlx::query("INSERT INTO thread_participants (thread_id, user_id) VALUES (?, ?)")
                .bind(&id)
                .bind(user_id)
                .execute(&mut *tx)
                .await
                .map_err(anyhow::Error::from)?;
        }
        tx.commit().await.map_err(anyhow::Error::from)?;

        Ok(Thread {
            id,
            participants: participants.iter().cloned().collect(),
            created_at: now.clone(),
            updated_at: now,
        })
    }
}
