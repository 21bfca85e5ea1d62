//! Event processor: decode → upsert → find candidates → build matches → persist.
//!
//! Side effects happen in that order and are not rolled back: an entity that
//! was indexed stays indexed even if persisting its matches fails afterwards.
//!
//! ## Settlement policy
//!
//! | Outcome | Disposition |
//! |---------|-------------|
//! | payload does not decode / validate | `Drop` |
//! | indexing or search backend error | `Ack` (logged) |
//! | some or all match inserts failed | `Ack` (logged) |
//! | processed | `Ack` |

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, info, warn};

use jobmatch_core::{DomainError, EntityKind, Indexable, Job, JobSeeker, Match};
use jobmatch_events::{Delivery, Disposition, MessageHandler};

use crate::match_store::{InsertOutcome, MatchStore};
use crate::search::{SearchError, SearchIndex};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed {kind} payload: {source}")]
    Decode {
        kind: EntityKind,
        #[source]
        source: DomainError,
    },

    #[error("could not encode {kind} {id} as a search document: {message}")]
    Encode {
        kind: EntityKind,
        id: String,
        message: String,
    },

    #[error("indexing {kind} {id} failed: {source}")]
    Index {
        kind: EntityKind,
        id: String,
        #[source]
        source: SearchError,
    },

    #[error("candidate search for {kind} {id} failed: {source}")]
    Search {
        kind: EntityKind,
        id: String,
        #[source]
        source: SearchError,
    },
}

impl PipelineError {
    /// Whether the payload itself is at fault (as opposed to a backend).
    pub fn is_malformed_input(&self) -> bool {
        matches!(self, PipelineError::Decode { .. })
    }
}

/// Summary of processing one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub entity_id: String,
    pub candidates: usize,
    /// Candidates whose stored document could not be decoded.
    pub skipped: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// The matching pipeline, shared by both consumers.
#[derive(Debug)]
pub struct MatchPipeline<S, M> {
    index: S,
    store: M,
    result_limit: usize,
}

impl<S, M> MatchPipeline<S, M>
where
    S: SearchIndex,
    M: MatchStore,
{
    pub fn new(index: S, store: M, result_limit: usize) -> Self {
        Self {
            index,
            store,
            result_limit,
        }
    }

    pub fn index(&self) -> &S {
        &self.index
    }

    pub fn store(&self) -> &M {
        &self.store
    }

    /// Decode a payload of the given kind and process it.
    pub async fn process_payload(&self, kind: EntityKind, payload: &[u8]) -> Result<ProcessOutcome, PipelineError> {
        let decode = |source| PipelineError::Decode { kind, source };
        match kind {
            EntityKind::JobSeeker => {
                let seeker = JobSeeker::from_json(payload).map_err(decode)?;
                self.process_job_seeker(&seeker).await
            }
            EntityKind::Job => {
                let job = Job::from_json(payload).map_err(decode)?;
                self.process_job(&job).await
            }
        }
    }

    /// Index a job seeker and record a match with every job it fits.
    pub async fn process_job_seeker(&self, seeker: &JobSeeker) -> Result<ProcessOutcome, PipelineError> {
        self.process::<JobSeeker, Job>(seeker, Match::between).await
    }

    /// Index a job and record a match with every job seeker it fits.
    pub async fn process_job(&self, job: &Job) -> Result<ProcessOutcome, PipelineError> {
        self.process::<Job, JobSeeker>(job, |job, seeker| Match::between(seeker, job))
            .await
    }

    async fn process<E, O>(&self, entity: &E, pair: fn(&E, &O) -> Match) -> Result<ProcessOutcome, PipelineError>
    where
        E: Indexable + Sync,
        O: Indexable + DeserializeOwned,
    {
        let kind = E::KIND;
        let id = entity.id().to_string();

        let document = serde_json::to_value(entity).map_err(|e| PipelineError::Encode {
            kind,
            id: id.clone(),
            message: e.to_string(),
        })?;

        self.index
            .upsert(kind, &id, &document)
            .await
            .map_err(|source| PipelineError::Index {
                kind,
                id: id.clone(),
                source,
            })?;

        let candidates = self
            .index
            .find_candidates(kind.opposite(), entity.location(), entity.tags(), self.result_limit)
            .await
            .map_err(|source| PipelineError::Search {
                kind,
                id: id.clone(),
                source,
            })?;

        let mut outcome = ProcessOutcome {
            entity_id: id,
            candidates: candidates.len(),
            ..ProcessOutcome::default()
        };

        let mut matches = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            match serde_json::from_value::<O>(candidate.document) {
                Ok(other) => matches.push(pair(entity, &other)),
                Err(err) => {
                    outcome.skipped += 1;
                    warn!(
                        kind = %kind.opposite(),
                        candidate_id = %candidate.id,
                        error = %err,
                        "skipping candidate document that does not decode"
                    );
                }
            }
        }

        if matches.is_empty() {
            return Ok(outcome);
        }

        for (m, result) in matches.iter().zip(self.store.insert_batch(&matches).await) {
            match result {
                InsertOutcome::Inserted => outcome.inserted += 1,
                InsertOutcome::Duplicate => outcome.duplicates += 1,
                InsertOutcome::Failed(reason) => {
                    outcome.failed += 1;
                    warn!(user_id = %m.user_id(), job_id = %m.job_id(), error = %reason, "failed to store match");
                }
            }
        }

        Ok(outcome)
    }
}

/// Consumer-side adapter from deliveries of one queue to the pipeline.
pub struct PipelineHandler<S, M> {
    pipeline: Arc<MatchPipeline<S, M>>,
    kind: EntityKind,
}

impl<S, M> PipelineHandler<S, M> {
    pub fn new(pipeline: Arc<MatchPipeline<S, M>>, kind: EntityKind) -> Self {
        Self { pipeline, kind }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }
}

#[async_trait]
impl<S, M> MessageHandler for PipelineHandler<S, M>
where
    S: SearchIndex,
    M: MatchStore,
{
    async fn handle(&self, delivery: &Delivery) -> Disposition {
        match self.pipeline.process_payload(self.kind, delivery.payload()).await {
            Ok(outcome) => {
                info!(
                    kind = %self.kind,
                    id = %outcome.entity_id,
                    candidates = outcome.candidates,
                    inserted = outcome.inserted,
                    duplicates = outcome.duplicates,
                    failed = outcome.failed,
                    "processed"
                );
                Disposition::Ack
            }
            Err(err) if err.is_malformed_input() => {
                warn!(
                    queue = delivery.queue(),
                    error = %err,
                    payload = %delivery.payload_lossy(),
                    "dropping malformed message"
                );
                Disposition::Drop
            }
            Err(err) => {
                error!(queue = delivery.queue(), error = %err, "processing failed; message consumed");
                Disposition::Ack
            }
        }
    }
}
