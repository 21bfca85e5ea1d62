//! Match persistence.
//!
//! A match is stored at most once per `(user_id, job_id)`. Inserts are
//! "insert, ignore on conflict" so concurrent consumers cannot both create the
//! same row; a conflict is reported as a duplicate, not an error.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use jobmatch_core::{JobId, Match, UserId};

pub use in_memory::InMemoryMatchStore;
pub use postgres::PostgresMatchStore;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MatchStoreError {
    #[error("match store connection error: {0}")]
    Connection(String),

    #[error("match store query error in {operation}: {message}")]
    Query { operation: &'static str, message: String },

    #[error("stored match row is invalid: {0}")]
    InvalidRow(String),

    #[error("match store connection cancelled")]
    Cancelled,
}

/// Result of inserting one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row for the same `(user_id, job_id)` already exists.
    Duplicate,
    Failed(String),
}

#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn exists_match(&self, user_id: &UserId, job_id: &JobId) -> Result<bool, MatchStoreError>;

    /// Insert unless the key already exists. Returns whether a row was written.
    async fn insert_match_if_absent(&self, m: &Match) -> Result<bool, MatchStoreError>;

    async fn matches_for_user(&self, user_id: &UserId) -> Result<Vec<Match>, MatchStoreError>;

    async fn matches_for_job(&self, job_id: &JobId) -> Result<Vec<Match>, MatchStoreError>;

    /// Insert each match independently; one failure never stops the rest.
    async fn insert_batch(&self, matches: &[Match]) -> Vec<InsertOutcome> {
        let mut outcomes = Vec::with_capacity(matches.len());
        for m in matches {
            let outcome = match self.insert_match_if_absent(m).await {
                Ok(true) => InsertOutcome::Inserted,
                Ok(false) => InsertOutcome::Duplicate,
                Err(err) => InsertOutcome::Failed(err.to_string()),
            };
            outcomes.push(outcome);
        }
        outcomes
    }
}

#[async_trait]
impl<S> MatchStore for Arc<S>
where
    S: MatchStore + ?Sized,
{
    async fn exists_match(&self, user_id: &UserId, job_id: &JobId) -> Result<bool, MatchStoreError> {
        (**self).exists_match(user_id, job_id).await
    }

    async fn insert_match_if_absent(&self, m: &Match) -> Result<bool, MatchStoreError> {
        (**self).insert_match_if_absent(m).await
    }

    async fn matches_for_user(&self, user_id: &UserId) -> Result<Vec<Match>, MatchStoreError> {
        (**self).matches_for_user(user_id).await
    }

    async fn matches_for_job(&self, job_id: &JobId) -> Result<Vec<Match>, MatchStoreError> {
        (**self).matches_for_job(job_id).await
    }

    async fn insert_batch(&self, matches: &[Match]) -> Vec<InsertOutcome> {
        (**self).insert_batch(matches).await
    }
}
