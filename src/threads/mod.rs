//! Conversation threads: model, storage contract, and the find-or-create
//! resolution service that is the heart of the daemon.

pub mod model;
pub mod resolver;
pub mod store;

pub use model::Thread;
pub use resolver::{Resolution, ResolveError, ThreadResolver};
pub use store::{SqliteThreadStore, ThreadStore};
