//! Infrastructure message bus implementations.
//!
//! The bus abstraction lives in `jobmatch-events` as pure mechanics.
//! This module provides infrastructure-backed implementations (Redis).

#[cfg(feature = "redis")]
pub mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::RedisStreamsBus;
