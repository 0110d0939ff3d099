//! # taskstore
//!
//! Postgres-backed storage for a deferred task engine.
//!
//! Provides three stores partitioned by queue name: a priority work queue,
//! a time-ordered schedule, and a key/value result store. The engine that
//! produces and consumes tasks lives elsewhere; payloads are opaque bytes.

pub mod config;
pub mod db;
pub mod error;
pub mod storage;
pub mod telemetry;
pub mod time;

pub use db::Db;
pub use error::{Error, Result};
pub use storage::memory::{MemoryDb, MemoryStorage};
pub use storage::postgres::PgStorage;
pub use storage::{StoreStats, TaskStorage};
