//! Postgres-backed [`TaskStorage`].

use super::TaskStorage;
use crate::db::Db;
use crate::error::Result;
use crate::telemetry::store::start_store_span;
use crate::time::{epoch_seconds, to_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashMap;
use tracing::{Instrument, Span};

/// One partition of a shared Postgres database.
///
/// Holds no state besides the pool handle and the queue name; every item
/// lives in the database.
#[derive(Debug, Clone)]
pub struct PgStorage {
    db: Db,
    name: String,
}

impl PgStorage {
    pub fn new(db: Db, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    fn span(&self, store: &'static str, operation: &'static str) -> Span {
        start_store_span(store, operation, &self.name)
    }
}

#[async_trait]
impl TaskStorage for PgStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, data: &[u8], priority: i32) -> Result<()> {
        self.db
            .enqueue(&self.name, data, priority)
            .instrument(self.span("queue", "enqueue"))
            .await
    }

    async fn dequeue(&self) -> Result<Option<Vec<u8>>> {
        self.db
            .dequeue(&self.name)
            .instrument(self.span("queue", "dequeue"))
            .await
    }

    async fn queue_size(&self) -> Result<u64> {
        self.db
            .queue_size(&self.name)
            .instrument(self.span("queue", "size"))
            .await
    }

    async fn enqueued_items(&self, limit: Option<usize>) -> Result<Vec<Vec<u8>>> {
        self.db
            .enqueued_items(&self.name, limit)
            .instrument(self.span("queue", "items"))
            .await
    }

    async fn flush_queue(&self) -> Result<u64> {
        let removed = self
            .db
            .flush_queue(&self.name)
            .instrument(self.span("queue", "flush"))
            .await?;
        tracing::info!(queue = %self.name, removed, "queue flushed");
        Ok(removed)
    }

    async fn add_to_schedule(
        &self,
        data: &[u8],
        eligible_at: NaiveDateTime,
        utc: bool,
    ) -> Result<()> {
        let eligible_at = to_timestamp(eligible_at, utc)?;
        self.db
            .add_to_schedule(&self.name, data, eligible_at)
            .instrument(self.span("schedule", "add"))
            .await
    }

    async fn read_schedule(&self, now: DateTime<Utc>) -> Result<Vec<Vec<u8>>> {
        self.db
            .read_schedule(&self.name, epoch_seconds(now))
            .instrument(self.span("schedule", "read"))
            .await
    }

    async fn schedule_size(&self) -> Result<u64> {
        self.db
            .schedule_size(&self.name)
            .instrument(self.span("schedule", "size"))
            .await
    }

    async fn scheduled_items(&self, limit: Option<usize>) -> Result<Vec<Vec<u8>>> {
        self.db
            .scheduled_items(&self.name, limit)
            .instrument(self.span("schedule", "items"))
            .await
    }

    async fn flush_schedule(&self) -> Result<u64> {
        let removed = self
            .db
            .flush_schedule(&self.name)
            .instrument(self.span("schedule", "flush"))
            .await?;
        tracing::info!(queue = %self.name, removed, "schedule flushed");
        Ok(removed)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .put(&self.name, key, value)
            .instrument(self.span("kv", "put"))
            .await
    }

    async fn peek(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .peek(&self.name, key)
            .instrument(self.span("kv", "peek"))
            .await
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.db
            .pop(&self.name, key)
            .instrument(self.span("kv", "pop"))
            .await
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        self.db
            .has_key(&self.name, key)
            .instrument(self.span("kv", "has_key"))
            .await
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool> {
        self.db
            .put_if_absent(&self.name, key, value)
            .instrument(self.span("kv", "put_if_absent"))
            .await
    }

    async fn result_store_size(&self) -> Result<u64> {
        self.db
            .result_store_size(&self.name)
            .instrument(self.span("kv", "size"))
            .await
    }

    async fn result_items(&self) -> Result<HashMap<String, Vec<u8>>> {
        self.db
            .result_items(&self.name)
            .instrument(self.span("kv", "items"))
            .await
    }

    async fn flush_results(&self) -> Result<u64> {
        let removed = self
            .db
            .flush_results(&self.name)
            .instrument(self.span("kv", "flush"))
            .await?;
        tracing::info!(queue = %self.name, removed, "results flushed");
        Ok(removed)
    }
}
