//! Thread data model for two-party (or N-party) conversation threading.
//!
//! Threads are stored in SQLite and serialized over the REST wire. A thread
//! is identified by its exact participant set; `participant_key` is the
//! canonical order-independent encoding of that set and carries a UNIQUE
//! constraint in storage.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A conversation thread: an opaque id plus an exact, fixed-size set of
/// participant user ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    /// Participant user ids, sorted. Immutable after creation.
    pub participants: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Thread {
    /// True if `user_id` belongs to this thread.
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}

/// Canonical encoding of a participant set: sorted ids joined with `:`.
///
/// Deterministic and order-independent, so set-equal inputs always produce
/// the same key. The `threads.participant_key` UNIQUE constraint on this
/// value is what makes concurrent duplicate creation impossible.
pub fn participant_key(participants: &BTreeSet<String>) -> String {
    participants
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(":")
}
