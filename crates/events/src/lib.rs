//! Message-bus mechanics for the matching pipeline.
//!
//! Transport-agnostic pieces only: what a delivery is, how a handler settles it,
//! how the connector drives the connection lifecycle, and how startup retries
//! back off. Concrete transports live in `jobmatch-infra`.

pub mod bus;
pub mod connector;
pub mod delivery;
pub mod handler;
pub mod in_memory_bus;
pub mod retry;

pub use bus::{BusError, MessageBus};
pub use connector::{BusConnector, ConnectorState};
pub use delivery::{Delivery, Disposition};
pub use handler::MessageHandler;
pub use in_memory_bus::{InMemoryBus, Settlement};
pub use retry::{retry, RetryError, RetryPolicy};
