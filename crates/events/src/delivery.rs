use std::borrow::Cow;

use chrono::{DateTime, Utc};

/// A single message handed to a consumer by the bus.
///
/// This is the unit a handler settles. It carries:
/// - the **queue** it was consumed from,
/// - a transport-specific **delivery id** used to acknowledge it,
/// - the raw **payload** (decoding is the handler's job),
/// - whether the bus has delivered it before.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    queue: String,
    delivery_id: String,
    payload: Vec<u8>,
    redelivered: bool,
    received_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(queue: impl Into<String>, delivery_id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            queue: queue.into(),
            delivery_id: delivery_id.into(),
            payload,
            redelivered: false,
            received_at: Utc::now(),
        }
    }

    pub fn redelivered(mut self, redelivered: bool) -> Self {
        self.redelivered = redelivered;
        self
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn delivery_id(&self) -> &str {
        &self.delivery_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload as text, with invalid UTF-8 replaced (for logging).
    pub fn payload_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }

    pub fn is_redelivered(&self) -> bool {
        self.redelivered
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// What the consumer should do with a delivery once its handler returns.
///
/// Handlers never talk to the bus directly; they return a disposition and the
/// consumer loop applies it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Processed (successfully or not); remove it from the queue.
    Ack,
    /// Unprocessable (e.g. undecodable payload); remove it from the queue without
    /// processing. Redelivering garbage would loop forever.
    Drop,
    /// Put it back on the queue for another attempt.
    Requeue,
}

impl core::fmt::Display for Disposition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Disposition::Ack => "ack",
            Disposition::Drop => "drop",
            Disposition::Requeue => "requeue",
        })
    }
}
