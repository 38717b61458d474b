//! Identity resolution seam.
//!
//! Real authentication lives outside the daemon; this module only answers
//! "which of these ids are real users?". The trait exists so the resolver
//! can be exercised without a database.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::collections::BTreeSet;

/// Validates candidate participant ids against the user registry.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The subset of `ids` that resolve to existing users.
    async fn filter_existing(&self, ids: &BTreeSet<String>) -> anyhow::Result<BTreeSet<String>>;
}

/// SQLite-backed identity provider over the daemon's `users` table.
#[derive(Clone)]
pub struct SqliteIdentityProvider {
    pool: SqlitePool,
}

impl SqliteIdentityProvider {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for SqliteIdentityProvider {
    async fn filter_existing(&self, ids: &BTreeSet<String>) -> anyhow::Result<BTreeSet<String>> {
        if ids.is_empty() {
            return Ok(BTreeSet::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!("SELECT id FROM users WHERE id IN ({placeholders})");
        let mut query = sqlx::query_as::<_, (String,)>(&sql);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
