use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use jobmatch_events::{BusConnector, BusError, Delivery, MessageBus, MessageHandler};

/// Timing knobs of a consumer loop.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// How long one receive may wait for a message.
    pub poll_wait: Duration,
    /// Pause after a failed receive or settle before reconnecting.
    pub fault_backoff: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_wait: Duration::from_secs(1),
            fault_backoff: Duration::from_secs(5),
        }
    }
}

/// Handle to stop and join a background consumer.
#[derive(Debug)]
pub struct WorkerHandle {
    name: String,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request graceful shutdown and wait for the in-flight message to settle.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.join().await;
    }

    /// Wait for the worker to stop on its own (its token was cancelled elsewhere).
    pub async fn join(self) {
        if let Err(err) = self.join.await {
            warn!(worker = %self.name, error = %err, "consumer task ended abnormally");
        }
    }
}

/// Consumer loop for one queue.
///
/// - Pulls one delivery at a time from the connector
/// - Hands it to the handler and settles it with the returned disposition
/// - Backs off and reconnects when receiving or settling fails
/// - Stops pulling once cancelled; a delivery already being handled is finished
#[derive(Debug)]
pub struct ConsumerWorker;

impl ConsumerWorker {
    /// Spawn a tokio task consuming `queue`. The task stops when `cancel` fires.
    pub fn spawn<B, H>(
        queue: impl Into<String>,
        connector: Arc<BusConnector<B>>,
        handler: H,
        settings: WorkerSettings,
        cancel: CancellationToken,
    ) -> WorkerHandle
    where
        B: MessageBus + 'static,
        H: MessageHandler + 'static,
    {
        let queue = queue.into();
        let name = format!("consumer:{queue}");
        let loop_cancel = cancel.clone();

        let join = tokio::spawn(worker_loop(queue, connector, handler, settings, loop_cancel));

        WorkerHandle { name, cancel, join }
    }
}

async fn worker_loop<B, H>(
    queue: String,
    connector: Arc<BusConnector<B>>,
    handler: H,
    settings: WorkerSettings,
    cancel: CancellationToken,
) where
    B: MessageBus,
    H: MessageHandler,
{
    info!(queue = %queue, "consumer started");

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = connector.next_delivery(&queue, settings.poll_wait) => next,
        };

        let fault = match next {
            Ok(Some(delivery)) => match process(&connector, &handler, &delivery).await {
                Ok(()) => continue,
                Err(err) => {
                    warn!(
                        queue = %queue,
                        delivery_id = delivery.delivery_id(),
                        error = %err,
                        "settlement failed; message may be redelivered"
                    );
                    err
                }
            },
            Ok(None) => continue,
            Err(err) => {
                warn!(queue = %queue, error = %err, "receive failed; backing off");
                err
            }
        };

        debug!(queue = %queue, error = %fault, "reconnecting after fault");
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(settings.fault_backoff) => {}
        }
        if let Err(err) = connector.reestablish().await {
            warn!(queue = %queue, error = %err, "reconnect failed");
        }
    }

    info!(queue = %queue, "consumer stopped");
}

async fn process<B, H>(connector: &BusConnector<B>, handler: &H, delivery: &Delivery) -> Result<(), BusError>
where
    B: MessageBus,
    H: MessageHandler,
{
    let disposition = handler.handle(delivery).await;
    debug!(
        queue = delivery.queue(),
        delivery_id = delivery.delivery_id(),
        disposition = %disposition,
        held_ms = (chrono::Utc::now() - delivery.received_at()).num_milliseconds(),
        "settling"
    );

    connector.settle(delivery, disposition).await
}
