//! Partitioned task storage.
//!
//! A [`TaskStorage`] is bound to one queue name and exposes the three stores
//! of that partition: the work queue, the schedule, and the key/value result
//! store. Absence is always `None` or an empty collection, never an error,
//! so a stored empty value stays distinguishable from a missing one.

pub mod memory;
pub mod postgres;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Item counts of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct StoreStats {
    pub queued: u64,
    pub scheduled: u64,
    pub results: u64,
}

#[async_trait]
pub trait TaskStorage: Send + Sync {
    /// The queue name this storage is partitioned by.
    fn name(&self) -> &str;

    // -----------------------------------------------------------------------
    // Work queue
    // -----------------------------------------------------------------------

    /// Add a payload to the queue. Higher priorities are dequeued first.
    async fn enqueue(&self, data: &[u8], priority: i32) -> Result<()>;

    /// Atomically remove and return the next payload, or `None` if empty.
    async fn dequeue(&self) -> Result<Option<Vec<u8>>>;

    async fn queue_size(&self) -> Result<u64>;

    /// Payloads in dequeue order, capped at `limit`. Nothing is removed.
    async fn enqueued_items(&self, limit: Option<usize>) -> Result<Vec<Vec<u8>>>;

    /// Remove every queued payload. Returns how many were removed.
    async fn flush_queue(&self) -> Result<u64>;

    // -----------------------------------------------------------------------
    // Schedule
    // -----------------------------------------------------------------------

    /// Schedule a payload for `eligible_at`, read as UTC when `utc` is set
    /// and as local time otherwise.
    async fn add_to_schedule(
        &self,
        data: &[u8],
        eligible_at: NaiveDateTime,
        utc: bool,
    ) -> Result<()>;

    /// Remove and return every payload eligible at `now`. Each payload is
    /// returned by exactly one call.
    async fn read_schedule(&self, now: DateTime<Utc>) -> Result<Vec<Vec<u8>>>;

    async fn schedule_size(&self) -> Result<u64>;

    /// Scheduled payloads, earliest first, capped at `limit`.
    async fn scheduled_items(&self, limit: Option<usize>) -> Result<Vec<Vec<u8>>>;

    async fn flush_schedule(&self) -> Result<u64>;

    // -----------------------------------------------------------------------
    // Key/value results
    // -----------------------------------------------------------------------

    /// Create or replace the value under `key`.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn peek(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Atomically remove and return the value under `key`.
    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn has_key(&self, key: &str) -> Result<bool>;

    /// Store `value` only if `key` is absent. Returns whether it was stored.
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool>;

    async fn result_store_size(&self) -> Result<u64>;

    async fn result_items(&self) -> Result<HashMap<String, Vec<u8>>>;

    async fn flush_results(&self) -> Result<u64>;

    // -----------------------------------------------------------------------
    // Whole partition
    // -----------------------------------------------------------------------

    /// Flush the queue, the schedule, and the results of this partition.
    async fn flush_all(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            queued: self.flush_queue().await?,
            scheduled: self.flush_schedule().await?,
            results: self.flush_results().await?,
        })
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            queued: self.queue_size().await?,
            scheduled: self.schedule_size().await?,
            results: self.result_store_size().await?,
        })
    }
}
