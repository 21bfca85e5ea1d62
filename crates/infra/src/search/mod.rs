//! Search index adapters.
//!
//! The index stores one document per entity, keyed by its id, in the index of
//! the entity's kind. Matching is a filter predicate: exact `location` equality
//! plus at least one shared tag. Ranking is left to the backend; callers only
//! rely on the order being by descending score.

pub mod elasticsearch;
pub mod in_memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use jobmatch_core::EntityKind;
use jobmatch_events::{retry, RetryError, RetryPolicy};

pub use elasticsearch::ElasticsearchIndex;
pub use in_memory::InMemorySearchIndex;

/// Index receiving the trivial writes of [`await_ready`].
pub const READINESS_INDEX: &str = "jobmatch_readiness";

/// A document returned by [`SearchIndex::find_candidates`].
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub score: f64,
    pub document: JsonValue,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("search backend unreachable: {0}")]
    Network(String),

    #[error("search backend returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected search response: {0}")]
    Parse(String),

    #[error("search backend unavailable: {0}")]
    Unavailable(String),
}

/// Why the search backend never became ready.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadinessError {
    #[error("search backend not ready after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("readiness wait cancelled")]
    Cancelled,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Write or overwrite `document` under `id` in the index of `kind`.
    async fn upsert(&self, kind: EntityKind, id: &str, document: &JsonValue) -> Result<(), SearchError>;

    /// Documents of `kind` in `location` sharing at least one of `tags`, best first.
    ///
    /// Empty `tags` yields nothing. A missing index yields nothing.
    async fn find_candidates(
        &self,
        kind: EntityKind,
        location: &str,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Candidate>, SearchError>;

    /// One trivial write to [`READINESS_INDEX`].
    async fn probe(&self) -> Result<(), SearchError>;
}

#[async_trait]
impl<S> SearchIndex for Arc<S>
where
    S: SearchIndex + ?Sized,
{
    async fn upsert(&self, kind: EntityKind, id: &str, document: &JsonValue) -> Result<(), SearchError> {
        (**self).upsert(kind, id, document).await
    }

    async fn find_candidates(
        &self,
        kind: EntityKind,
        location: &str,
        tags: &[String],
        limit: usize,
    ) -> Result<Vec<Candidate>, SearchError> {
        (**self).find_candidates(kind, location, tags, limit).await
    }

    async fn probe(&self) -> Result<(), SearchError> {
        (**self).probe().await
    }
}

/// Probe `index` until a write succeeds, `max_attempts` are spent, or `cancel` fires.
pub async fn await_ready<S>(
    index: &S,
    max_attempts: u32,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), ReadinessError>
where
    S: SearchIndex + ?Sized,
{
    let policy = RetryPolicy::fixed(max_attempts, interval);

    match retry(&policy, cancel, "search.await_ready", move |_| index.probe()).await {
        Ok(()) => {
            info!("search backend is ready");
            Ok(())
        }
        Err(RetryError::Exhausted {
            attempts,
            last_error,
        }) => Err(ReadinessError::Exhausted {
            attempts,
            last_error: last_error.to_string(),
        }),
        Err(RetryError::Cancelled { .. }) => Err(ReadinessError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ready_after_transient_failures() {
        let index = InMemorySearchIndex::new();
        index.fail_next_writes(3);

        await_ready(&index, 10, Duration::from_millis(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(index.probe_attempts(), 4);
    }

    #[tokio::test]
    async fn exhaustion_is_distinguishable() {
        let index = InMemorySearchIndex::new();
        index.fail_next_writes(100);

        let err = await_ready(&index, 5, Duration::from_millis(1), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ReadinessError::Exhausted { attempts: 5, .. }));
        assert_eq!(index.probe_attempts(), 5);
    }

    #[tokio::test]
    async fn cancellation_stops_the_wait() {
        let index = InMemorySearchIndex::new();
        index.fail_next_writes(u32::MAX);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = await_ready(&index, 150, Duration::from_secs(3600), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, ReadinessError::Cancelled);
    }
}
