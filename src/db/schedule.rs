//! Schedule operations via direct SQLx.
//!
//! `eligible_at` is stored as epoch seconds. Draining deletes and returns in
//! a single statement: a row is returned by exactly one drain even when
//! several consumers drain the same partition at once.

use crate::error::Result;
use crate::telemetry::store::record_operation;
use crate::time::now_millis;
use std::time::Instant;

const STORE: &str = "schedule";

impl super::Db {
    /// Insert one item that becomes eligible at `eligible_at` (epoch seconds).
    pub async fn add_to_schedule(
        &self,
        queue_name: &str,
        data: &[u8],
        eligible_at: f64,
    ) -> Result<()> {
        let started = Instant::now();
        sqlx::query(
            "INSERT INTO schedule_items (queue_name, data, eligible_at, inserted_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(queue_name)
        .bind(data)
        .bind(eligible_at)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        record_operation(STORE, "add", "ok", started);
        Ok(())
    }

    /// Remove and return every item with `eligible_at <= now`, oldest first.
    pub async fn read_schedule(&self, queue_name: &str, now: f64) -> Result<Vec<Vec<u8>>> {
        let started = Instant::now();
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(
            "WITH drained AS (
                 DELETE FROM schedule_items
                 WHERE queue_name = $1 AND eligible_at <= $2
                 RETURNING id, data, eligible_at
             )
             SELECT data FROM drained ORDER BY eligible_at ASC, id ASC",
        )
        .bind(queue_name)
        .bind(now)
        .fetch_all(self.pool())
        .await?;

        let outcome = if rows.is_empty() { "empty" } else { "ok" };
        record_operation(STORE, "read", outcome, started);
        tracing::debug!(drained = rows.len(), "schedule drained");
        Ok(rows.into_iter().map(|(data,)| data).collect())
    }

    /// Number of items still waiting in the schedule.
    pub async fn schedule_size(&self, queue_name: &str) -> Result<u64> {
        let started = Instant::now();
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM schedule_items WHERE queue_name = $1")
                .bind(queue_name)
                .fetch_one(self.pool())
                .await?;
        record_operation(STORE, "size", "ok", started);
        Ok(count as u64)
    }

    /// Scheduled payloads ordered by eligibility, without removing them.
    pub async fn scheduled_items(
        &self,
        queue_name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Vec<u8>>> {
        let started = Instant::now();
        let rows: Vec<(Vec<u8>,)> = sqlx::query_as(
            "SELECT data FROM schedule_items
             WHERE queue_name = $1
             ORDER BY eligible_at ASC, id ASC
             LIMIT $2",
        )
        .bind(queue_name)
        .bind(limit.map(super::sql_limit))
        .fetch_all(self.pool())
        .await?;
        record_operation(STORE, "items", "ok", started);
        Ok(rows.into_iter().map(|(data,)| data).collect())
    }

    /// Delete every scheduled item of `queue_name`. Returns the number removed.
    pub async fn flush_schedule(&self, queue_name: &str) -> Result<u64> {
        let started = Instant::now();
        let removed = sqlx::query("DELETE FROM schedule_items WHERE queue_name = $1")
            .bind(queue_name)
            .execute(self.pool())
            .await?
            .rows_affected();
        record_operation(STORE, "flush", "ok", started);
        Ok(removed)
    }
}
