use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::info;

use jobmatch_core::EntityKind;
use jobmatch_events::{BusConnector, BusError, MessageBus};
use jobmatch_infra::event_bus::RedisStreamsBus;
use jobmatch_infra::{
    await_ready, BusConfig, ConsumerWorker, ElasticsearchIndex, MatchPipeline, MatchStore, MatchStoreError,
    PipelineHandler, PostgresMatchStore, ReadinessError, SearchIndex, ServiceConfig, WorkerHandle, WorkerSettings,
};

/// Run the service until `shutdown` fires.
///
/// Startup order: search readiness, match store, bus. Cancelling during
/// startup returns `Ok(())` without starting the consumers.
pub async fn run(config: ServiceConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    info!(config = ?config, "starting matching service");

    let index = Arc::new(ElasticsearchIndex::new(&config.elastic)?);
    match await_ready(
        index.as_ref(),
        config.elastic.ready_attempts,
        config.elastic.ready_interval,
        &shutdown,
    )
    .await
    {
        Ok(()) => {}
        Err(ReadinessError::Cancelled) => return Ok(()),
        Err(err) => return Err(err).context("search backend never became ready"),
    }

    let store = match PostgresMatchStore::connect_with_retry(&config.database, &shutdown).await {
        Ok(store) => Arc::new(store),
        Err(MatchStoreError::Cancelled) => return Ok(()),
        Err(err) => return Err(err).context("could not connect to the match store"),
    };
    store.ensure_schema().await.context("could not create the match table")?;

    let pipeline = Arc::new(MatchPipeline::new(index, store, config.elastic.result_limit));

    let bus = RedisStreamsBus::new(&config.bus)?;
    let connector = Arc::new(BusConnector::new(bus, config.bus.queues(), config.bus.retry_policy()));
    match connector.connect(&shutdown).await {
        Ok(()) => {}
        Err(BusError::Cancelled) => return Ok(()),
        Err(err) => return Err(err).context("could not connect to the message bus"),
    }

    let workers = spawn_consumers(&connector, pipeline, &config.bus, WorkerSettings::default(), &shutdown);
    info!("matching service running");

    shutdown.cancelled().await;
    info!("shutting down; draining consumers");
    drain(workers).await;
    connector.disconnect();

    info!("matching service stopped");
    Ok(())
}

/// Start one consumer per queue, both sharing `pipeline`.
pub fn spawn_consumers<B, S, M>(
    connector: &Arc<BusConnector<B>>,
    pipeline: Arc<MatchPipeline<S, M>>,
    bus: &BusConfig,
    settings: WorkerSettings,
    shutdown: &CancellationToken,
) -> Vec<WorkerHandle>
where
    B: MessageBus + 'static,
    S: SearchIndex + 'static,
    M: MatchStore + 'static,
{
    vec![
        ConsumerWorker::spawn(
            bus.jobseeker_queue.clone(),
            connector.clone(),
            PipelineHandler::new(pipeline.clone(), EntityKind::JobSeeker),
            settings,
            shutdown.child_token(),
        ),
        ConsumerWorker::spawn(
            bus.job_queue.clone(),
            connector.clone(),
            PipelineHandler::new(pipeline, EntityKind::Job),
            settings,
            shutdown.child_token(),
        ),
    ]
}

/// Stop every worker and wait for in-flight messages to settle.
pub async fn drain(workers: Vec<WorkerHandle>) {
    for worker in workers {
        let name = worker.name().to_string();
        worker.shutdown().await;
        info!(worker = %name, "consumer drained");
    }
}
