//! Postgres-backed match store.
//!
//! ## Schema
//!
//! ```sql
//! user_job_mapping(
//!     user_id          TEXT NOT NULL,
//!     job_id           TEXT NOT NULL,
//!     recruiter_id     TEXT NULL,
//!     user_likes       BOOLEAN NULL,
//!     recruiter_likes  BOOLEAN NULL,
//!     PRIMARY KEY (user_id, job_id)
//! )
//! ```
//!
//! The primary key is what enforces "one row per pair"; inserts use
//! `ON CONFLICT DO NOTHING` and read the affected row count.
//!
//! ## Thread Safety
//!
//! `PostgresMatchStore` is `Send + Sync`; all access goes through the SQLx pool.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use jobmatch_core::{JobId, Match, RecruiterId, UserId};
use jobmatch_events::{retry, RetryError};

use super::{MatchStore, MatchStoreError};
use crate::config::DatabaseConfig;

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS user_job_mapping (
        user_id          TEXT NOT NULL,
        job_id           TEXT NOT NULL,
        recruiter_id     TEXT NULL,
        user_likes       BOOLEAN NULL,
        recruiter_likes  BOOLEAN NULL,
        PRIMARY KEY (user_id, job_id)
    )
"#;

const MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct PostgresMatchStore {
    pool: Arc<PgPool>,
}

impl PostgresMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect, retrying with the configured delay until it works or `cancel` fires.
    pub async fn connect_with_retry(
        config: &DatabaseConfig,
        cancel: &CancellationToken,
    ) -> Result<Self, MatchStoreError> {
        let options = config.connect_options();
        let policy = config.retry_policy();

        let pool = retry(&policy, cancel, "match_store.connect", |attempt| {
            info!(attempt, host = %config.host, database = %config.name, "connecting to match store");
            PgPoolOptions::new()
                .max_connections(MAX_CONNECTIONS)
                .connect_with(options.clone())
        })
        .await
        .map_err(|err| match err {
            RetryError::Cancelled { .. } => MatchStoreError::Cancelled,
            RetryError::Exhausted { last_error, .. } => MatchStoreError::Connection(last_error.to_string()),
        })?;

        info!("connected to match store");
        Ok(Self::new(pool))
    }

    /// Create `user_job_mapping` if it does not exist.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), MatchStoreError> {
        sqlx::query(CREATE_TABLE)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    async fn select_where(
        &self,
        operation: &'static str,
        sql: &'static str,
        value: &str,
    ) -> Result<Vec<Match>, MatchStoreError> {
        let rows = sqlx::query(sql)
            .bind(value)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;

        rows.iter().map(match_from_row).collect()
    }
}

fn match_from_row(row: &PgRow) -> Result<Match, MatchStoreError> {
    let invalid = |e: sqlx::Error| MatchStoreError::InvalidRow(e.to_string());

    let user_id: String = row.try_get("user_id").map_err(invalid)?;
    let job_id: String = row.try_get("job_id").map_err(invalid)?;
    let recruiter_id: Option<String> = row.try_get("recruiter_id").map_err(invalid)?;
    let user_likes: Option<bool> = row.try_get("user_likes").map_err(invalid)?;
    let recruiter_likes: Option<bool> = row.try_get("recruiter_likes").map_err(invalid)?;

    let id_err = |e: jobmatch_core::DomainError| MatchStoreError::InvalidRow(e.to_string());
    Ok(Match::restore(
        UserId::new(user_id).map_err(id_err)?,
        JobId::new(job_id).map_err(id_err)?,
        recruiter_id
            .filter(|r| !r.trim().is_empty())
            .map(RecruiterId::new)
            .transpose()
            .map_err(id_err)?,
        user_likes,
        recruiter_likes,
    ))
}

fn map_sqlx_error(operation: &'static str, err: sqlx::Error) -> MatchStoreError {
    match err {
        sqlx::Error::Database(db_err) => MatchStoreError::Query {
            operation,
            message: db_err.message().to_string(),
        },
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            MatchStoreError::Connection(format!("{operation}: {err}"))
        }
        other => MatchStoreError::Query {
            operation,
            message: other.to_string(),
        },
    }
}

#[async_trait]
impl MatchStore for PostgresMatchStore {
    #[instrument(skip(self), fields(user_id = %user_id, job_id = %job_id), err)]
    async fn exists_match(&self, user_id: &UserId, job_id: &JobId) -> Result<bool, MatchStoreError> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM user_job_mapping WHERE user_id = $1 AND job_id = $2)",
        )
        .bind(user_id.as_str())
        .bind(job_id.as_str())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("exists_match", e))?;

        row.try_get::<bool, _>(0)
            .map_err(|e| MatchStoreError::InvalidRow(e.to_string()))
    }

    #[instrument(skip(self, m), fields(user_id = %m.user_id(), job_id = %m.job_id()), err)]
    async fn insert_match_if_absent(&self, m: &Match) -> Result<bool, MatchStoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_job_mapping (user_id, job_id, recruiter_id, user_likes, recruiter_likes)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id, job_id) DO NOTHING
            "#,
        )
        .bind(m.user_id().as_str())
        .bind(m.job_id().as_str())
        .bind(m.recruiter_id().map(|r| r.as_str()))
        .bind(m.user_likes())
        .bind(m.recruiter_likes())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_match_if_absent", e))?;

        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn matches_for_user(&self, user_id: &UserId) -> Result<Vec<Match>, MatchStoreError> {
        self.select_where(
            "matches_for_user",
            "SELECT user_id, job_id, recruiter_id, user_likes, recruiter_likes \
             FROM user_job_mapping WHERE user_id = $1 ORDER BY job_id",
            user_id.as_str(),
        )
        .await
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn matches_for_job(&self, job_id: &JobId) -> Result<Vec<Match>, MatchStoreError> {
        self.select_where(
            "matches_for_job",
            "SELECT user_id, job_id, recruiter_id, user_likes, recruiter_likes \
             FROM user_job_mapping WHERE job_id = $1 ORDER BY user_id",
            job_id.as_str(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_errors_are_connection_errors() {
        let err = map_sqlx_error("exists_match", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, MatchStoreError::Connection(_)));

        let err = map_sqlx_error("exists_match", sqlx::Error::RowNotFound);
        assert!(matches!(err, MatchStoreError::Query { operation: "exists_match", .. }));
    }

    #[test]
    fn schema_keys_on_the_pair_only() {
        assert!(CREATE_TABLE.contains("PRIMARY KEY (user_id, job_id)"));
        assert!(CREATE_TABLE.contains("user_likes       BOOLEAN NULL"));
    }
}
