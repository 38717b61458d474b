//! Thread identity resolution: find the unique thread for an exact
//! participant set, or create it exactly once.
//!
//! The resolver itself is stateless between calls — all coordination with
//! concurrent resolvers happens through the store's uniqueness constraint.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::identity::IdentityProvider;

use super::model::Thread;
use super::store::{CreateError, ThreadStore};

/// Errors returned by the resolver. Both variants are client-input errors;
/// infrastructure failures travel through `Store`.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("a thread must have exactly {expected} participants, got {actual}")]
    InvalidParticipantCount { expected: usize, actual: usize },
    #[error("unknown participant id(s): {}", ids.join(", "))]
    UnknownParticipant { ids: Vec<String> },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ResolveError {
    /// True for errors caused by the caller's input (surfaced as HTTP 400).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ResolveError::InvalidParticipantCount { .. } | ResolveError::UnknownParticipant { .. }
        )
    }
}

/// Outcome of a resolve call: the canonical thread plus whether this call
/// materialized it.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub thread: Thread,
    pub created: bool,
}

/// Find-or-create service for conversation threads.
pub struct ThreadResolver {
    store: Arc<dyn ThreadStore>,
    identity: Arc<dyn IdentityProvider>,
    /// Fixed thread size N. Startup configuration, never mutated at runtime.
    thread_size: usize,
}

impl ThreadResolver {
    pub fn new(
        store: Arc<dyn ThreadStore>,
        identity: Arc<dyn IdentityProvider>,
        thread_size: usize,
    ) -> Self {
        Self {
            store,
            identity,
            thread_size,
        }
    }

    /// Resolve the thread containing exactly `{requester} ∪ others`.
    ///
    /// Idempotent for the caller: given valid input it always succeeds, and
    /// set-equal inputs (any order, with duplicates) always land on the same
    /// thread. A lost creation race is handled internally by re-reading.
    pub async fn resolve(
        &self,
        requester_id: &str,
        other_participant_ids: &[String],
    ) -> Result<Resolution, ResolveError> {
        // The requester is always implicitly part of the set; duplicates
        // collapse here, which is what makes the count check catch them.
        let mut participants: BTreeSet<String> =
            other_participant_ids.iter().cloned().collect();
        participants.insert(requester_id.to_string());

        if participants.len() != self.thread_size {
            return Err(ResolveError::InvalidParticipantCount {
                expected: self.thread_size,
                actual: participants.len(),
            });
        }

        // Count distinct resolved ids against the set size so one bad id
        // among valid ones cannot slip through.
        let known = self.identity.filter_existing(&participants).await?;
        if known.len() != participants.len() {
            let missing: Vec<String> = participants.difference(&known).cloned().collect();
            return Err(ResolveError::UnknownParticipant { ids: missing });
        }

        if let Some(existing) = self.lookup(&participants).await? {
            debug!(thread_id = %existing.id, "resolved existing thread");
            return Ok(Resolution {
                thread: existing,
                created: false,
            });
        }

        match self.store.create(&participants).await {
            Ok(thread) => {
                info!(thread_id = %thread.id, "created thread");
                Ok(Resolution {
                    thread,
                    created: true,
                })
            }
            // Lost the race: another resolver committed the same set between
            // our lookup and create. Re-read and report "found".
            Err(CreateError::AlreadyExists) => {
                let thread = self.lookup(&participants).await?.ok_or_else(|| {
                    anyhow::anyhow!("thread missing after create conflict")
                })?;
                debug!(thread_id = %thread.id, "create lost race, returning existing thread");
                Ok(Resolution {
                    thread,
                    created: false,
                })
            }
            Err(CreateError::Store(e)) => Err(ResolveError::Store(e)),
        }
    }

    /// Filter-then-verify lookup: the candidate query over-approximates
    /// (any membership overlap), so each candidate's full participant set is
    /// compared for exact set equality. Cardinality alone is not enough —
    /// two size-N threads can partially overlap.
    async fn lookup(
        &self,
        participants: &BTreeSet<String>,
    ) -> Result<Option<Thread>, ResolveError> {
        let candidates = self.store.find_candidates(participants).await?;
        for candidate in candidates {
            let members = self.store.participants(&candidate.id).await?;
            if &members == participants {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }
}
