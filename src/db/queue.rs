//! Work queue operations via direct SQLx.
//!
//! Items leave the queue ordered by priority (highest first), then by row
//! id (oldest first). `inserted_at` is kept as data only: the sequence
//! behind `id` never steps backward the way the wall clock can.

use crate::error::Result;
use crate::telemetry::store::record_operation;
use crate::time::now_millis;
use std::time::Instant;

const STORE: &str = "queue";

impl super::Db {
    /// Insert one item into the queue of `queue_name`.
    pub async fn enqueue(&self, queue_name: &str, data: &[u8], priority: i32) -> Result<()> {
        let started = Instant::now();
        sqlx::query(
            "INSERT INTO queue_items (queue_name, data, priority, inserted_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(queue_name)
        .bind(data)
        .bind(priority)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        record_operation(STORE, "enqueue", "ok", started);
        Ok(())
    }

    /// Remove and return the head of the queue. `None` if the queue is empty.
    ///
    /// Find and delete happen in one statement. Rows locked by a concurrent
    /// dequeue are skipped, so two callers never receive the same item.
    pub async fn dequeue(&self, queue_name: &str) -> Result<Option<Vec<u8>>> {
        let started = Instant::now();
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "DELETE FROM queue_items
             WHERE id = (
                 SELECT id FROM queue_items
                 WHERE queue_name = $1
                 ORDER BY priority DESC, id ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING data",
        )
        .bind(queue_name)
        .fetch_optional(self.pool())
        .await?;

        let outcome = if row.is_some() { "ok" } else { "empty" };
        record_operation(STORE, "dequeue", outcome, started);
        Ok(row.map(|(data,)| data))
    }

    /// Number of items waiting in the queue.
    pub async fn queue_size(&self, queue_name: &str) -> Result<u64> {
        let started = Instant::now();
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM queue_items WHERE queue_name = $1")
                .bind(queue_name)
                .fetch_one(self.pool())
                .await?;
        record_operation(STORE, "size", "ok", started);
        Ok(count as u64)
    }

    /// Payloads in dequeue order, without removing them.
    pub async fn enqueued_items(
        &self,
        queue_name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Vec<u8>>> {
        let started = Instant::now();
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(
            "SELECT data FROM queue_items
             WHERE queue_name = $1
             ORDER BY priority DESC, id ASC
             LIMIT $2",
        )
        .bind(queue_name)
        .bind(limit.map(super::sql_limit))
        .fetch_all(self.pool())
        .await?;
        record_operation(STORE, "items", "ok", started);
        Ok(rows.into_iter().map(|(data,)| data).collect())
    }

    /// Delete every queued item of `queue_name`. Returns the number removed.
    pub async fn flush_queue(&self, queue_name: &str) -> Result<u64> {
        let started = Instant::now();
        let removed = sqlx::query("DELETE FROM queue_items WHERE queue_name = $1")
            .bind(queue_name)
            .execute(self.pool())
            .await?
            .rows_affected();
        record_operation(STORE, "flush", "ok", started);
        Ok(removed)
    }
}
