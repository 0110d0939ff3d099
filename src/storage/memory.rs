//! In-process [`TaskStorage`].
//!
//! [`MemoryDb`] plays the role of the shared database: one set of tables,
//! partitioned by queue name, behind a single lock. Every operation holds
//! the lock for its whole duration, which makes each one atomic.

use super::TaskStorage;
use crate::error::Result;
use crate::telemetry::metrics;
use crate::telemetry::store::record_operation;
use crate::time::{epoch_seconds, to_timestamp};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use opentelemetry::KeyValue;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

/// Dequeue order: priority descending, then sequence (insertion order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<i32>,
    seq: u64,
}

/// Drain order: eligibility ascending, then sequence.
#[derive(Debug, Clone, Copy)]
struct ScheduleKey {
    eligible_at: f64,
    seq: u64,
}

impl PartialEq for ScheduleKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScheduleKey {}

impl PartialOrd for ScheduleKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduleKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.eligible_at
            .total_cmp(&other.eligible_at)
            .then(self.seq.cmp(&other.seq))
    }
}

#[derive(Debug, Default)]
struct Tables {
    queue: HashMap<String, BTreeMap<QueueKey, Vec<u8>>>,
    schedule: HashMap<String, BTreeMap<ScheduleKey, Vec<u8>>>,
    kv: HashMap<String, HashMap<String, Vec<u8>>>,
    /// Monotonic row sequence shared by all tables.
    next_seq: u64,
}

impl Tables {
    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

/// Shared in-memory tables. Clones share the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryDb {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// A storage view of the partition `name`.
    pub fn storage(&self, name: impl Into<String>) -> MemoryStorage {
        MemoryStorage {
            db: self.clone(),
            name: name.into(),
        }
    }
}

/// One partition of a [`MemoryDb`].
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    db: MemoryDb,
    name: String,
}

impl MemoryStorage {
    /// A storage over its own, private tables.
    pub fn new(name: impl Into<String>) -> Self {
        MemoryDb::new().storage(name)
    }
}

fn outcome<T>(found: &Option<T>) -> &'static str {
    if found.is_some() { "ok" } else { "empty" }
}

fn ok<T>(op: (&'static str, &'static str), started: Instant, value: T) -> Result<T> {
    record_operation(op.0, op.1, "ok", started);
    Ok(value)
}

fn first_n(items: impl Iterator<Item = Vec<u8>>, limit: Option<usize>) -> Vec<Vec<u8>> {
    items.take(limit.unwrap_or(usize::MAX)).collect()
}

#[async_trait]
impl TaskStorage for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn enqueue(&self, data: &[u8], priority: i32) -> Result<()> {
        let started = Instant::now();
        let mut tables = self.db.tables.lock().await;
        let key = QueueKey {
            priority: Reverse(priority),
            seq: tables.next_seq(),
        };
        tables
            .queue
            .entry(self.name.clone())
            .or_default()
            .insert(key, data.to_vec());
        ok(("queue", "enqueue"), started, ())
    }

    async fn dequeue(&self) -> Result<Option<Vec<u8>>> {
        let started = Instant::now();
        let mut tables = self.db.tables.lock().await;
        let data = tables
            .queue
            .get_mut(&self.name)
            .and_then(|items| items.pop_first())
            .map(|(_, data)| data);
        record_operation("queue", "dequeue", outcome(&data), started);
        Ok(data)
    }

    async fn queue_size(&self) -> Result<u64> {
        let started = Instant::now();
        let tables = self.db.tables.lock().await;
        let count = tables.queue.get(&self.name).map_or(0, |q| q.len() as u64);
        ok(("queue", "size"), started, count)
    }

    async fn enqueued_items(&self, limit: Option<usize>) -> Result<Vec<Vec<u8>>> {
        let started = Instant::now();
        let tables = self.db.tables.lock().await;
        let items = tables
            .queue
            .get(&self.name)
            .map(|q| first_n(q.values().cloned(), limit))
            .unwrap_or_default();
        ok(("queue", "items"), started, items)
    }

    async fn flush_queue(&self) -> Result<u64> {
        let started = Instant::now();
        let mut tables = self.db.tables.lock().await;
        let removed = tables.queue.remove(&self.name).map_or(0, |q| q.len() as u64);
        ok(("queue", "flush"), started, removed)
    }

    async fn add_to_schedule(
        &self,
        data: &[u8],
        eligible_at: NaiveDateTime,
        utc: bool,
    ) -> Result<()> {
        let started = Instant::now();
        let eligible_at = to_timestamp(eligible_at, utc)?;
        let mut tables = self.db.tables.lock().await;
        let key = ScheduleKey {
            eligible_at,
            seq: tables.next_seq(),
        };
        tables
            .schedule
            .entry(self.name.clone())
            .or_default()
            .insert(key, data.to_vec());
        ok(("schedule", "add"), started, ())
    }

    async fn read_schedule(&self, now: DateTime<Utc>) -> Result<Vec<Vec<u8>>> {
        let started = Instant::now();
        let now = epoch_seconds(now);
        let mut tables = self.db.tables.lock().await;
        let mut drained = Vec::new();
        if let Some(items) = tables.schedule.get_mut(&self.name) {
            while let Some(entry) = items.first_entry() {
                if entry.key().eligible_at > now {
                    break;
                }
                drained.push(entry.remove());
            }
        }
        let result = if drained.is_empty() { "empty" } else { "ok" };
        record_operation("schedule", "read", result, started);
        Ok(drained)
    }

    async fn schedule_size(&self) -> Result<u64> {
        let started = Instant::now();
        let tables = self.db.tables.lock().await;
        let count = tables.schedule.get(&self.name).map_or(0, |s| s.len() as u64);
        ok(("schedule", "size"), started, count)
    }

    async fn scheduled_items(&self, limit: Option<usize>) -> Result<Vec<Vec<u8>>> {
        let started = Instant::now();
        let tables = self.db.tables.lock().await;
        let items = tables
            .schedule
            .get(&self.name)
            .map(|s| first_n(s.values().cloned(), limit))
            .unwrap_or_default();
        ok(("schedule", "items"), started, items)
    }

    async fn flush_schedule(&self) -> Result<u64> {
        let started = Instant::now();
        let mut tables = self.db.tables.lock().await;
        let removed = tables
            .schedule
            .remove(&self.name)
            .map_or(0, |s| s.len() as u64);
        ok(("schedule", "flush"), started, removed)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let started = Instant::now();
        let mut tables = self.db.tables.lock().await;
        tables
            .kv
            .entry(self.name.clone())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        ok(("kv", "put"), started, ())
    }

    async fn peek(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let started = Instant::now();
        let tables = self.db.tables.lock().await;
        let value = tables
            .kv
            .get(&self.name)
            .and_then(|kv| kv.get(key))
            .cloned();
        record_operation("kv", "peek", outcome(&value), started);
        Ok(value)
    }

    async fn pop(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let started = Instant::now();
        let mut tables = self.db.tables.lock().await;
        let value = tables
            .kv
            .get_mut(&self.name)
            .and_then(|kv| kv.remove(key));
        record_operation("kv", "pop", outcome(&value), started);
        Ok(value)
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        let started = Instant::now();
        let tables = self.db.tables.lock().await;
        let exists = tables
            .kv
            .get(&self.name)
            .is_some_and(|kv| kv.contains_key(key));
        ok(("kv", "has_key"), started, exists)
    }

    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool> {
        let started = Instant::now();
        let mut tables = self.db.tables.lock().await;
        let kv = tables.kv.entry(self.name.clone()).or_default();
        if kv.contains_key(key) {
            metrics::put_if_absent_conflicts().add(1, &[KeyValue::new("store", "kv")]);
            record_operation("kv", "put_if_absent", "conflict", started);
            return Ok(false);
        }
        kv.insert(key.to_string(), value.to_vec());
        ok(("kv", "put_if_absent"), started, true)
    }

    async fn result_store_size(&self) -> Result<u64> {
        let started = Instant::now();
        let tables = self.db.tables.lock().await;
        let count = tables.kv.get(&self.name).map_or(0, |kv| kv.len() as u64);
        ok(("kv", "size"), started, count)
    }

    async fn result_items(&self) -> Result<HashMap<String, Vec<u8>>> {
        let started = Instant::now();
        let tables = self.db.tables.lock().await;
        let items = tables.kv.get(&self.name).cloned().unwrap_or_default();
        ok(("kv", "items"), started, items)
    }

    async fn flush_results(&self) -> Result<u64> {
        let started = Instant::now();
        let mut tables = self.db.tables.lock().await;
        let removed = tables.kv.remove(&self.name).map_or(0, |kv| kv.len() as u64);
        ok(("kv", "flush"), started, removed)
    }
}
