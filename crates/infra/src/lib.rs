//! Infrastructure layer: bus transport, search index, match store, config,
//! and the pipeline that ties them together.

pub mod config;
pub mod event_bus;
pub mod match_store;
pub mod pipeline;
pub mod search;
pub mod workers;

#[cfg(test)]
mod integration_tests;

pub use config::{BusConfig, ConfigError, DatabaseConfig, ElasticConfig, ServiceConfig};
pub use match_store::{InMemoryMatchStore, InsertOutcome, MatchStore, MatchStoreError, PostgresMatchStore};
pub use pipeline::{MatchPipeline, PipelineError, PipelineHandler, ProcessOutcome};
pub use search::{await_ready, Candidate, ElasticsearchIndex, InMemorySearchIndex, ReadinessError, SearchError, SearchIndex};
pub use workers::{ConsumerWorker, WorkerHandle, WorkerSettings};
