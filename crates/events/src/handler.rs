use std::sync::Arc;

use async_trait::async_trait;

use crate::delivery::{Delivery, Disposition};

/// Handles one delivery and decides how it is settled.
///
/// The handler owns the settlement policy (an undecodable payload is dropped, a
/// backend failure is still acknowledged); the consumer loop applies it.
///
/// Handlers are invoked with at most one in-flight delivery per queue.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, delivery: &Delivery) -> Disposition;
}

#[async_trait]
impl<H> MessageHandler for Arc<H>
where
    H: MessageHandler + ?Sized,
{
    async fn handle(&self, delivery: &Delivery) -> Disposition {
        (**self).handle(delivery).await
    }
}
