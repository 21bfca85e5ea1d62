//! Matching service: wires configuration, adapters, the bus connector and the
//! two consumers together.

pub mod app;
