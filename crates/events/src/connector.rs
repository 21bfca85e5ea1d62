//! Bus connection lifecycle.
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Subscribed ──receive ok──▶ Consuming
//!                               │    ▲                 │                     │  ▲
//!                    attempt failed  │ backoff          └────receive err──▶ Faulted
//!                               └────┘
//!                               budget exhausted ──▶ Faulted (fatal at startup)
//! ```
//!
//! `Faulted` during consumption (a failed receive or settle) is not terminal:
//! the consumer calls `reestablish` and the state returns to `Consuming` on the
//! next successful receive.

use std::sync::RwLock;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::bus::{BusError, MessageBus};
use crate::delivery::{Delivery, Disposition};
use crate::retry::{retry, RetryError, RetryPolicy};

/// Observable state of a [`BusConnector`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorState {
    Disconnected,
    Connecting { attempt: u32 },
    Subscribed,
    Consuming,
    Faulted { reason: String },
}

impl ConnectorState {
    /// Whether deliveries may be pulled in this state.
    pub fn is_established(&self) -> bool {
        matches!(
            self,
            ConnectorState::Subscribed | ConnectorState::Consuming | ConnectorState::Faulted { .. }
        )
    }
}

/// Owns the connection to the bus and the set of durable queues it consumes.
///
/// The connector is created explicitly and shared (behind an `Arc`) by the
/// consumer workers; there is no process-wide connection singleton.
pub struct BusConnector<B> {
    bus: B,
    queues: Vec<String>,
    retry: RetryPolicy,
    state: RwLock<ConnectorState>,
}

impl<B> BusConnector<B>
where
    B: MessageBus,
{
    pub fn new(bus: B, queues: Vec<String>, retry: RetryPolicy) -> Self {
        Self {
            bus,
            queues,
            retry,
            state: RwLock::new(ConnectorState::Disconnected),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    pub fn state(&self) -> ConnectorState {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_state(&self, next: ConnectorState) {
        if let Ok(mut state) = self.state.write() {
            *state = next;
        }
    }

    /// Connect and declare every queue, retrying with the configured backoff.
    ///
    /// Returns `BusError::RetryExhausted` once the attempt budget is spent and
    /// `BusError::Cancelled` if `cancel` fires first.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), BusError> {
        let outcome = retry(&self.retry, cancel, "bus.connect", move |attempt| {
            self.set_state(ConnectorState::Connecting { attempt });
            info!(attempt, "connecting to message bus");
            self.establish()
        })
        .await;

        match outcome {
            Ok(()) => {
                self.set_state(ConnectorState::Subscribed);
                info!(queues = ?self.queues, "connected to message bus; queues declared");
                Ok(())
            }
            Err(RetryError::Exhausted {
                attempts,
                last_error,
            }) => {
                error!(attempts, error = %last_error, "max retries reached; could not connect to message bus");
                self.set_state(ConnectorState::Faulted {
                    reason: last_error.to_string(),
                });
                Err(BusError::RetryExhausted {
                    attempts,
                    last_error: last_error.to_string(),
                })
            }
            Err(RetryError::Cancelled { .. }) => {
                self.set_state(ConnectorState::Disconnected);
                Err(BusError::Cancelled)
            }
        }
    }

    /// One reconnect attempt after a fault; the state stays `Faulted` if it fails.
    pub async fn reestablish(&self) -> Result<(), BusError> {
        match self.establish().await {
            Ok(()) => {
                info!("reconnected to message bus");
                self.set_state(ConnectorState::Subscribed);
                Ok(())
            }
            Err(err) => {
                self.set_state(ConnectorState::Faulted {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn establish(&self) -> Result<(), BusError> {
        self.bus.connect().await?;
        for queue in &self.queues {
            self.bus.declare_queue(queue).await?;
        }
        Ok(())
    }

    /// Pull the next delivery of `queue`, tracking `Consuming`/`Faulted`.
    pub async fn next_delivery(
        &self,
        queue: &str,
        wait: Duration,
    ) -> Result<Option<Delivery>, BusError> {
        if !self.state().is_established() {
            return Err(BusError::NotConnected);
        }
        if !self.queues.iter().any(|q| q == queue) {
            return Err(BusError::UnknownQueue(queue.to_string()));
        }

        match self.bus.receive(queue, wait).await {
            Ok(delivery) => {
                self.set_state(ConnectorState::Consuming);
                Ok(delivery)
            }
            Err(err) => {
                warn!(queue, error = %err, "receive failed; connector faulted");
                self.set_state(ConnectorState::Faulted {
                    reason: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Apply `disposition`; a failure faults the connector like a failed receive.
    pub async fn settle(&self, delivery: &Delivery, disposition: Disposition) -> Result<(), BusError> {
        let result = self.bus.settle(delivery, disposition).await;
        if let Err(err) = &result {
            self.set_state(ConnectorState::Faulted {
                reason: err.to_string(),
            });
        }
        result
    }

    /// Mark the connector as no longer consuming (shutdown).
    pub fn disconnect(&self) {
        self.set_state(ConnectorState::Disconnected);
    }
}
