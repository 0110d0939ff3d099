//! Key/value operations via direct SQLx.
//!
//! At most one row exists per (queue_name, key); the `kv_entries_queue_key`
//! unique constraint enforces it, and `put_if_absent` relies on it.

use crate::error::{Error, Result};
use crate::telemetry::metrics;
use crate::telemetry::store::record_operation;
use crate::time::now_millis;
use opentelemetry::KeyValue;
use std::collections::HashMap;
use std::time::Instant;

const STORE: &str = "kv";

impl super::Db {
    /// Create or replace the value stored under `key`.
    pub async fn put(&self, queue_name: &str, key: &str, value: &[u8]) -> Result<()> {
        let started = Instant::now();
        sqlx::query(
            "INSERT INTO kv_entries (queue_name, key, value, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT ON CONSTRAINT kv_entries_queue_key
             DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at",
        )
        .bind(queue_name)
        .bind(key)
        .bind(value)
        .bind(now_millis())
        .execute(self.pool())
        .await?;
        record_operation(STORE, "put", "ok", started);
        Ok(())
    }

    /// Current value under `key`, or `None` if absent.
    pub async fn peek(&self, queue_name: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let started = Instant::now();
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT value FROM kv_entries WHERE queue_name = $1 AND key = $2")
                .bind(queue_name)
                .bind(key)
                .fetch_optional(self.pool())
                .await?;
        let outcome = if row.is_some() { "ok" } else { "empty" };
        record_operation(STORE, "peek", outcome, started);
        Ok(row.map(|(value,)| value))
    }

    /// Remove and return the value under `key` in one statement.
    pub async fn pop(&self, queue_name: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let started = Instant::now();
        let row: Option<(Vec<u8>,)> = sqlx::query_as(
            "DELETE FROM kv_entries WHERE queue_name = $1 AND key = $2 RETURNING value",
        )
        .bind(queue_name)
        .bind(key)
        .fetch_optional(self.pool())
        .await?;
        let outcome = if row.is_some() { "ok" } else { "empty" };
        record_operation(STORE, "pop", outcome, started);
        Ok(row.map(|(value,)| value))
    }

    pub async fn has_key(&self, queue_name: &str, key: &str) -> Result<bool> {
        let started = Instant::now();
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM kv_entries WHERE queue_name = $1 AND key = $2)",
        )
        .bind(queue_name)
        .bind(key)
        .fetch_one(self.pool())
        .await?;
        record_operation(STORE, "has_key", "ok", started);
        Ok(exists)
    }

    /// Store `value` under `key` only if the key is absent.
    ///
    /// Returns `true` if this call created the entry, `false` if another
    /// writer already holds the key.
    pub async fn put_if_absent(&self, queue_name: &str, key: &str, value: &[u8]) -> Result<bool> {
        let started = Instant::now();
        let inserted: std::result::Result<Option<(String,)>, sqlx::Error> = sqlx::query_as(
            "INSERT INTO kv_entries (queue_name, key, value, updated_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT ON CONSTRAINT kv_entries_queue_key DO NOTHING
             RETURNING key",
        )
        .bind(queue_name)
        .bind(key)
        .bind(value)
        .bind(now_millis())
        .fetch_optional(self.pool())
        .await;

        let created = match inserted {
            Ok(row) => row.is_some(),
            // The constraint is the arbiter; losing the race is not an error.
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => false,
            Err(e) => return Err(Error::Database(e)),
        };

        if created {
            record_operation(STORE, "put_if_absent", "ok", started);
        } else {
            metrics::put_if_absent_conflicts().add(1, &[KeyValue::new("store", STORE)]);
            record_operation(STORE, "put_if_absent", "conflict", started);
        }
        Ok(created)
    }

    /// Number of entries in the partition.
    pub async fn result_store_size(&self, queue_name: &str) -> Result<u64> {
        let started = Instant::now();
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM kv_entries WHERE queue_name = $1")
                .bind(queue_name)
                .fetch_one(self.pool())
                .await?;
        record_operation(STORE, "size", "ok", started);
        Ok(count as u64)
    }

    /// Snapshot of every key and value in the partition.
    pub async fn result_items(&self, queue_name: &str) -> Result<HashMap<String, Vec<u8>>> {
        let started = Instant::now();
        let rows: Vec<(String, Vec<u8>)> =
            sqlx::query_as("SELECT key, value FROM kv_entries WHERE queue_name = $1")
                .bind(queue_name)
                .fetch_all(self.pool())
                .await?;
        record_operation(STORE, "items", "ok", started);
        Ok(rows.into_iter().collect())
    }

    /// Delete every entry of `queue_name`. Returns the number removed.
    pub async fn flush_results(&self, queue_name: &str) -> Result<u64> {
        let started = Instant::now();
        let removed = sqlx::query("DELETE FROM kv_entries WHERE queue_name = $1")
            .bind(queue_name)
            .execute(self.pool())
            .await?
            .rows_affected();
        record_operation(STORE, "flush", "ok", started);
        Ok(removed)
    }
}
