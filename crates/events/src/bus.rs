//! Message bus abstraction (mechanics only).
//!
//! This module provides the **consumer side** of a durable, queue-based bus:
//! named queues that survive restarts, one-at-a-time delivery and explicit,
//! per-message settlement.
//!
//! ## Delivery Guarantees
//!
//! - **At-least-once**: a delivery that is never settled may be handed out again
//! - **Per-queue FIFO**: deliveries of one queue arrive in publication order
//! - **No cross-queue ordering**: two queues are independent streams
//!
//! Consumers must therefore be idempotent. In this system they are: entities are
//! upserted by id and matches are deduplicated by `(user_id, job_id)`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::delivery::{Delivery, Disposition};

/// Bus operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("bus connection error: {0}")]
    Connection(String),

    #[error("bus command error: {0}")]
    Command(String),

    #[error("bus is not connected")]
    NotConnected,

    #[error("queue '{0}' has not been declared")]
    UnknownQueue(String),

    /// The bounded connection budget was used up. Fatal at startup.
    #[error("could not connect to the bus after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    #[error("bus operation cancelled")]
    Cancelled,
}

/// Transport-agnostic message bus.
///
/// ## Lifecycle
///
/// 1. `connect()` establishes (or re-establishes) the transport connection
/// 2. `declare_queue()` idempotently creates a durable queue
/// 3. `receive()` pulls the next delivery of one queue, waiting up to `wait`
/// 4. `settle()` applies the handler's [`Disposition`] to that delivery
///
/// Implementations must be `Send + Sync`; the two consumer tasks share one bus.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn connect(&self) -> Result<(), BusError>;

    async fn declare_queue(&self, queue: &str) -> Result<(), BusError>;

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BusError>;

    /// Next delivery of `queue`, or `None` if nothing arrived within `wait`.
    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, BusError>;

    async fn settle(&self, delivery: &Delivery, disposition: Disposition) -> Result<(), BusError>;
}

#[async_trait]
impl<B> MessageBus for Arc<B>
where
    B: MessageBus + ?Sized,
{
    async fn connect(&self) -> Result<(), BusError> {
        (**self).connect().await
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BusError> {
        (**self).declare_queue(queue).await
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BusError> {
        (**self).publish(queue, payload).await
    }

    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, BusError> {
        (**self).receive(queue, wait).await
    }

    async fn settle(&self, delivery: &Delivery, disposition: Disposition) -> Result<(), BusError> {
        (**self).settle(delivery, disposition).await
    }
}
