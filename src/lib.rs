pub mod config;
pub mod identity;
pub mod rest;
pub mod storage;
pub mod threads;

use std::sync::Arc;

use config::DaemonConfig;
use identity::SqliteIdentityProvider;
use storage::Storage;
use threads::{SqliteThreadStore, ThreadResolver};

/// Shared daemon state handed to every request handler.
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    pub thread_store: Arc<SqliteThreadStore>,
    pub resolver: Arc<ThreadResolver>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire the storage, identity provider, and resolver over one shared
    /// SQLite pool.
    pub fn new(config: Arc<DaemonConfig>, storage: Arc<Storage>) -> Self {
        let pool = storage.pool();
        let thread_store = Arc::new(SqliteThreadStore::new(pool.clone()));
        let identity = Arc::new(SqliteIdentityProvider::new(pool));
        let resolver = Arc::new(ThreadResolver::new(
            thread_store.clone(),
            identity,
            config.max_participants_per_thread,
        ));
        Self {
            config,
            storage,
            thread_store,
            resolver,
            started_at: std::time::Instant::now(),
        }
    }
}
