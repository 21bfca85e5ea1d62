//! Redis Streams-backed message bus (durable, at-least-once delivery).
//!
//! This implementation uses Redis Streams (XADD/XREADGROUP/XACK) to provide:
//! - **Durable queues**: one stream per queue; entries persist until acknowledged
//! - **At-least-once**: an entry read but never acknowledged is handed out again
//! - **Consumer groups**: every instance of the service reads through one group
//! - **Namespacing**: stream keys live under the configured vhost
//!
//! ## Architecture
//!
//! - **Stream Key**: `<vhost>:<queue>` (or `<queue>` for the root vhost)
//! - **Consumer Group**: `recommendation` by default, created with `MKSTREAM`
//! - **Consumer**: a stable name, so pending entries survive restarts
//! - **Connections**: one for commands plus one per queue for blocking reads, so
//!   a `BLOCK` on one queue never delays an ack on the other
//!
//! ## Settlement
//!
//! | Disposition | Commands |
//! |-------------|----------|
//! | `Ack` / `Drop` | `XACK` |
//! | `Requeue` | `XADD` a copy to the tail, then `XACK` the original |

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisError};
use tracing::{debug, info, instrument, warn};

use jobmatch_events::{BusError, Delivery, Disposition, MessageBus};

use crate::config::BusConfig;

/// Stream field carrying the message body.
const PAYLOAD_FIELD: &str = "payload";

#[derive(Default)]
struct Connections {
    commands: Option<MultiplexedConnection>,
    readers: HashMap<String, MultiplexedConnection>,
}

pub struct RedisStreamsBus {
    client: redis::Client,
    namespace: Option<String>,
    group: String,
    consumer: String,
    connections: RwLock<Connections>,
}

impl core::fmt::Debug for RedisStreamsBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisStreamsBus")
            .field("namespace", &self.namespace)
            .field("group", &self.group)
            .field("consumer", &self.consumer)
            .finish_non_exhaustive()
    }
}

impl RedisStreamsBus {
    /// Create a bus for the given settings. No connection is made until `connect()`.
    pub fn new(config: &BusConfig) -> Result<Self, BusError> {
        let url = config.url().map_err(|e| BusError::Connection(e.to_string()))?;
        let client = redis::Client::open(url.as_str()).map_err(|e| BusError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            namespace: config.namespace().map(str::to_string),
            group: config.consumer_group.clone(),
            consumer: config.consumer_name.clone(),
            connections: RwLock::new(Connections::default()),
        })
    }

    /// Redis key of the stream backing `queue`.
    pub fn stream_key(&self, queue: &str) -> String {
        stream_key(self.namespace.as_deref(), queue)
    }

    fn command_connection(&self) -> Result<MultiplexedConnection, BusError> {
        self.connections
            .read()
            .map_err(|_| BusError::Command("connection lock poisoned".to_string()))?
            .commands
            .clone()
            .ok_or(BusError::NotConnected)
    }

    fn reader_connection(&self, queue: &str) -> Result<MultiplexedConnection, BusError> {
        let connections = self
            .connections
            .read()
            .map_err(|_| BusError::Command("connection lock poisoned".to_string()))?;
        if connections.commands.is_none() {
            return Err(BusError::NotConnected);
        }
        connections
            .readers
            .get(queue)
            .cloned()
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))
    }

    async fn open(&self) -> Result<MultiplexedConnection, BusError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_redis_error)
    }

    /// Read one entry for `queue` starting after `id` (`"0"` = own pending, `">"` = new).
    async fn read_one(
        &self,
        conn: &mut MultiplexedConnection,
        queue: &str,
        id: &str,
        block: Option<Duration>,
    ) -> Result<Option<StreamId>, BusError> {
        let key = self.stream_key(queue);
        let mut opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(1);
        if let Some(wait) = block {
            opts = opts.block(wait.as_millis().max(1) as usize);
        }

        let reply: Option<StreamReadReply> = conn
            .xread_options(&[key.as_str()], &[id], &opts)
            .await
            .map_err(map_redis_error)?;

        Ok(reply
            .into_iter()
            .flat_map(|r| r.keys)
            .flat_map(|k| k.ids)
            .next())
    }

    async fn ack(&self, conn: &mut MultiplexedConnection, queue: &str, id: &str) -> Result<(), BusError> {
        let key = self.stream_key(queue);
        let _: u64 = conn
            .xack(&key, &self.group, &[id])
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    fn into_delivery(queue: &str, entry: StreamId, redelivered: bool) -> Option<Delivery> {
        let value = entry.map.get(PAYLOAD_FIELD)?;
        let payload: Vec<u8> = redis::from_redis_value(value).ok()?;
        Some(Delivery::new(queue, entry.id, payload).redelivered(redelivered))
    }
}

pub(crate) fn stream_key(namespace: Option<&str>, queue: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}:{queue}"),
        None => queue.to_string(),
    }
}

fn map_redis_error(err: RedisError) -> BusError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
        BusError::Connection(err.to_string())
    } else {
        BusError::Command(err.to_string())
    }
}

#[async_trait]
impl MessageBus for RedisStreamsBus {
    async fn connect(&self) -> Result<(), BusError> {
        let conn = self.open().await?;

        let mut connections = self
            .connections
            .write()
            .map_err(|_| BusError::Command("connection lock poisoned".to_string()))?;
        connections.commands = Some(conn);
        connections.readers.clear();
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn declare_queue(&self, queue: &str) -> Result<(), BusError> {
        let mut conn = self.command_connection()?;
        let key = self.stream_key(queue);

        // "0": a fresh group starts at the beginning of the stream.
        let created: Result<(), RedisError> = conn.xgroup_create_mkstream(&key, &self.group, "0").await;
        match created {
            Ok(()) => info!(stream = %key, "consumer group created"),
            Err(err) if err.code() == Some("BUSYGROUP") => debug!(stream = %key, "consumer group exists"),
            Err(err) => return Err(map_redis_error(err)),
        }

        let reader = self.open().await?;
        self.connections
            .write()
            .map_err(|_| BusError::Command("connection lock poisoned".to_string()))?
            .readers
            .insert(queue.to_string(), reader);
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<(), BusError> {
        let mut conn = self.command_connection()?;
        let key = self.stream_key(queue);

        let _: String = conn
            .xadd(&key, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, BusError> {
        let mut conn = self.reader_connection(queue)?;

        // Entries this consumer read earlier but never settled come first.
        while let Some(entry) = self.read_one(&mut conn, queue, "0", None).await? {
            let id = entry.id.clone();
            match Self::into_delivery(queue, entry, true) {
                Some(delivery) => return Ok(Some(delivery)),
                None => {
                    warn!(queue, entry_id = %id, "pending entry has no payload; acknowledging");
                    self.ack(&mut conn, queue, &id).await?;
                }
            }
        }

        let block = (!wait.is_zero()).then_some(wait);
        loop {
            let Some(entry) = self.read_one(&mut conn, queue, ">", block).await? else {
                return Ok(None);
            };
            let id = entry.id.clone();
            match Self::into_delivery(queue, entry, false) {
                Some(delivery) => return Ok(Some(delivery)),
                None => {
                    warn!(queue, entry_id = %id, "stream entry has no payload; acknowledging");
                    self.ack(&mut conn, queue, &id).await?;
                }
            }
        }
    }

    #[instrument(
        skip(self, delivery, disposition),
        fields(queue = delivery.queue(), entry_id = delivery.delivery_id(), disposition = %disposition),
        err
    )]
    async fn settle(&self, delivery: &Delivery, disposition: Disposition) -> Result<(), BusError> {
        let mut conn = self.command_connection()?;

        if disposition == Disposition::Requeue {
            let key = self.stream_key(delivery.queue());
            let _: String = conn
                .xadd(&key, "*", &[(PAYLOAD_FIELD, delivery.payload())])
                .await
                .map_err(map_redis_error)?;
        }

        self.ack(&mut conn, delivery.queue(), delivery.delivery_id()).await
    }
}
