//! In-memory message bus for tests/dev.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::bus::{BusError, MessageBus};
use crate::delivery::{Delivery, Disposition};

/// A settled delivery, as recorded by [`InMemoryBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub queue: String,
    pub payload: Vec<u8>,
    pub disposition: Disposition,
}

#[derive(Debug, Default)]
struct State {
    connected: bool,
    declared: HashSet<String>,
    queues: HashMap<String, VecDeque<Delivery>>,
    in_flight: HashMap<String, Delivery>,
    settled: Vec<Settlement>,
    next_id: u64,
}

/// In-memory queue bus.
///
/// - No IO
/// - Per-queue FIFO, one delivery handed out per `receive`
/// - Records every settlement so tests can assert on acks and drops
/// - Can simulate connection failures
#[derive(Debug, Default)]
pub struct InMemoryBus {
    state: Mutex<State>,
    published: Notify,
    failing_connects: AtomicU32,
    failing_settles: AtomicU32,
    connect_attempts: AtomicU32,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls to `connect()` fail.
    pub fn fail_next_connects(&self, n: u32) {
        self.failing_connects.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` calls to `settle()` fail; the delivery stays in flight.
    pub fn fail_next_settles(&self, n: u32) {
        self.failing_settles.store(n, Ordering::SeqCst);
    }

    /// Simulate the broker going away; `receive` fails until the next `connect()`.
    pub fn drop_connection(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.connected = false;
        }
    }

    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn is_declared(&self, queue: &str) -> bool {
        self.state
            .lock()
            .map(|s| s.declared.contains(queue))
            .unwrap_or(false)
    }

    /// Deliveries waiting in `queue` (not counting in-flight ones).
    pub fn pending(&self, queue: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.queues.get(queue).map_or(0, VecDeque::len))
            .unwrap_or(0)
    }

    /// Deliveries handed out but not settled yet.
    pub fn in_flight(&self) -> usize {
        self.state.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.state
            .lock()
            .map(|s| s.settled.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, BusError> {
        self.state
            .lock()
            .map_err(|_| BusError::Command("in-memory bus lock poisoned".to_string()))
    }

    fn try_take(&self, queue: &str) -> Result<Option<Delivery>, BusError> {
        let mut state = self.lock()?;
        if !state.connected {
            return Err(BusError::NotConnected);
        }
        if !state.declared.contains(queue) {
            return Err(BusError::UnknownQueue(queue.to_string()));
        }

        let next = state.queues.get_mut(queue).and_then(VecDeque::pop_front);
        if let Some(delivery) = &next {
            state
                .in_flight
                .insert(delivery.delivery_id().to_string(), delivery.clone());
        }
        Ok(next)
    }
}

/// Consume one unit of an injected-failure budget.
fn take_one(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn connect(&self) -> Result<(), BusError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        if take_one(&self.failing_connects) {
            return Err(BusError::Connection("connection refused (simulated)".to_string()));
        }

        self.lock()?.connected = true;
        Ok(())
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), BusError> {
        let mut state = self.lock()?;
        if !state.connected {
            return Err(BusError::NotConnected);
        }
        state.declared.insert(queue.to_string());
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BusError> {
        {
            let mut state = self.lock()?;
            state.next_id += 1;
            let id = format!("{}-{}", queue, state.next_id);
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .push_back(Delivery::new(queue, id, payload.to_vec()));
        }
        self.published.notify_waiters();
        Ok(())
    }

    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, BusError> {
        // Register interest before checking so a publish in between is not missed.
        let published = self.published.notified();

        if let Some(delivery) = self.try_take(queue)? {
            return Ok(Some(delivery));
        }
        if wait.is_zero() {
            return Ok(None);
        }

        let _ = tokio::time::timeout(wait, published).await;
        self.try_take(queue)
    }

    async fn settle(&self, delivery: &Delivery, disposition: Disposition) -> Result<(), BusError> {
        if take_one(&self.failing_settles) {
            return Err(BusError::Connection("connection reset (simulated)".to_string()));
        }

        {
            let mut state = self.lock()?;
            let settled = state.in_flight.remove(delivery.delivery_id()).ok_or_else(|| {
                BusError::Command(format!("unknown delivery id {}", delivery.delivery_id()))
            })?;

            state.settled.push(Settlement {
                queue: settled.queue().to_string(),
                payload: settled.payload().to_vec(),
                disposition,
            });

            if disposition == Disposition::Requeue {
                state.next_id += 1;
                let queue = settled.queue().to_string();
                let id = format!("{}-{}", queue, state.next_id);
                let again = Delivery::new(queue, id, settled.into_payload()).redelivered(true);
                state
                    .queues
                    .entry(again.queue().to_string())
                    .or_default()
                    .push_back(again);
            }
        }

        if disposition == Disposition::Requeue {
            self.published.notify_waiters();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connected(queues: &[&str]) -> InMemoryBus {
        let bus = InMemoryBus::new();
        bus.connect().await.unwrap();
        for q in queues {
            bus.declare_queue(q).await.unwrap();
        }
        bus
    }

    #[tokio::test]
    async fn deliveries_are_fifo_per_queue() {
        let bus = connected(&["a", "b"]).await;
        bus.publish("a", b"1").await.unwrap();
        bus.publish("b", b"x").await.unwrap();
        bus.publish("a", b"2").await.unwrap();

        let first = bus.receive("a", Duration::ZERO).await.unwrap().unwrap();
        let second = bus.receive("a", Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(first.payload(), b"1");
        assert_eq!(second.payload(), b"2");
        assert!(bus.receive("a", Duration::ZERO).await.unwrap().is_none());
        assert_eq!(bus.pending("b"), 1);
    }

    #[tokio::test]
    async fn receive_waits_for_a_publish() {
        let bus = std::sync::Arc::new(connected(&["a"]).await);

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            publisher.publish("a", b"late").await.unwrap();
        });

        let got = bus.receive("a", Duration::from_secs(5)).await.unwrap();
        assert_eq!(got.map(Delivery::into_payload), Some(b"late".to_vec()));
    }

    #[tokio::test]
    async fn settlement_is_recorded_and_requeue_redelivers() {
        let bus = connected(&["a"]).await;
        bus.publish("a", b"m").await.unwrap();

        let d = bus.receive("a", Duration::ZERO).await.unwrap().unwrap();
        assert_eq!(bus.in_flight(), 1);
        bus.settle(&d, Disposition::Requeue).await.unwrap();

        let again = bus.receive("a", Duration::ZERO).await.unwrap().unwrap();
        assert!(again.is_redelivered());
        bus.settle(&again, Disposition::Ack).await.unwrap();

        let dispositions: Vec<_> = bus.settlements().into_iter().map(|s| s.disposition).collect();
        assert_eq!(dispositions, vec![Disposition::Requeue, Disposition::Ack]);
        assert_eq!(bus.in_flight(), 0);
        assert!(bus.settle(&again, Disposition::Ack).await.is_err());
    }

    #[tokio::test]
    async fn a_failed_settlement_leaves_the_delivery_in_flight() {
        let bus = connected(&["a"]).await;
        bus.publish("a", b"m").await.unwrap();
        bus.fail_next_settles(1);

        let d = bus.receive("a", Duration::ZERO).await.unwrap().unwrap();
        assert!(matches!(
            bus.settle(&d, Disposition::Ack).await,
            Err(BusError::Connection(_))
        ));
        assert_eq!(bus.in_flight(), 1);
        assert!(bus.settlements().is_empty());

        bus.settle(&d, Disposition::Ack).await.unwrap();
        assert_eq!(bus.in_flight(), 0);
    }

    #[tokio::test]
    async fn undeclared_queue_and_dropped_connection_are_errors() {
        let bus = connected(&["a"]).await;
        assert_eq!(
            bus.receive("zzz", Duration::ZERO).await.unwrap_err(),
            BusError::UnknownQueue("zzz".to_string())
        );

        bus.drop_connection();
        assert_eq!(bus.receive("a", Duration::ZERO).await.unwrap_err(), BusError::NotConnected);
    }
}
