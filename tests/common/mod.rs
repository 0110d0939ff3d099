//! Behavior every `TaskStorage` backend must show.
//!
//! Each check takes storages that are already bound to fresh, empty
//! partitions. Partition-isolation checks take two partitions of the same
//! database.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use taskstore::TaskStorage;

pub async fn dequeue_orders_by_priority_then_insertion<S: TaskStorage>(s: &S) {
    s.enqueue(b"A", 1).await.unwrap();
    s.enqueue(b"B", 5).await.unwrap();
    s.enqueue(b"C", 1).await.unwrap();

    assert_eq!(s.dequeue().await.unwrap().as_deref(), Some(&b"B"[..]));
    assert_eq!(s.dequeue().await.unwrap().as_deref(), Some(&b"A"[..]));
    assert_eq!(s.dequeue().await.unwrap().as_deref(), Some(&b"C"[..]));
    assert_eq!(s.dequeue().await.unwrap(), None);
}

/// Inserts land within the same millisecond; order must still hold.
pub async fn fifo_holds_for_rapid_inserts<S: TaskStorage>(s: &S) {
    for i in 0..50u32 {
        let priority = if i % 10 == 0 { -1 } else { 0 };
        s.enqueue(&i.to_be_bytes(), priority).await.unwrap();
    }

    let mut seen = Vec::new();
    while let Some(data) = s.dequeue().await.unwrap() {
        seen.push(u32::from_be_bytes(data.try_into().unwrap()));
    }

    let mut expected: Vec<u32> = (0..50).filter(|i| i % 10 != 0).collect();
    expected.extend((0..50).filter(|i| i % 10 == 0));
    assert_eq!(seen, expected);
}

pub async fn empty_dequeue_leaves_other_partition_alone<S: TaskStorage>(empty: &S, other: &S) {
    other.enqueue(b"keep", 0).await.unwrap();

    assert_eq!(empty.dequeue().await.unwrap(), None);
    assert_eq!(empty.queue_size().await.unwrap(), 0);
    assert_eq!(other.queue_size().await.unwrap(), 1);
}

pub async fn concurrent_dequeue_delivers_once<S: TaskStorage + 'static>(s: Arc<S>) {
    s.enqueue(b"only", 0).await.unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.dequeue().await.unwrap() })
        })
        .collect();

    let mut got = Vec::new();
    for h in handles {
        got.extend(h.await.unwrap());
    }
    assert_eq!(got, vec![b"only".to_vec()]);
}

pub async fn unbounded_limit_returns_everything<S: TaskStorage>(s: &S) {
    s.enqueue(b"a", 0).await.unwrap();
    let later = (Utc::now() + Duration::hours(1)).naive_utc();
    s.add_to_schedule(b"b", later, true).await.unwrap();

    assert_eq!(
        s.enqueued_items(Some(usize::MAX)).await.unwrap(),
        vec![b"a".to_vec()]
    );
    assert_eq!(
        s.scheduled_items(Some(usize::MAX)).await.unwrap(),
        vec![b"b".to_vec()]
    );
}

pub async fn enqueued_items_is_ordered_and_non_destructive<S: TaskStorage>(s: &S) {
    s.enqueue(b"low", 0).await.unwrap();
    s.enqueue(b"high", 9).await.unwrap();
    s.enqueue(b"mid", 3).await.unwrap();

    let all = s.enqueued_items(None).await.unwrap();
    assert_eq!(all, vec![b"high".to_vec(), b"mid".to_vec(), b"low".to_vec()]);

    let capped = s.enqueued_items(Some(2)).await.unwrap();
    assert_eq!(capped, vec![b"high".to_vec(), b"mid".to_vec()]);

    assert_eq!(s.queue_size().await.unwrap(), 3);
    assert_eq!(s.flush_queue().await.unwrap(), 3);
    assert_eq!(s.queue_size().await.unwrap(), 0);
}

pub async fn read_schedule_drains_only_eligible<S: TaskStorage>(s: &S) {
    let t = Utc::now();
    s.add_to_schedule(b"X", (t - Duration::seconds(10)).naive_utc(), true)
        .await
        .unwrap();
    s.add_to_schedule(b"Y", (t + Duration::seconds(100)).naive_utc(), true)
        .await
        .unwrap();

    assert_eq!(s.read_schedule(t).await.unwrap(), vec![b"X".to_vec()]);
    assert_eq!(s.schedule_size().await.unwrap(), 1);

    // Drained items never come back.
    assert!(s.read_schedule(t).await.unwrap().is_empty());

    let later = t + Duration::seconds(101);
    assert_eq!(s.read_schedule(later).await.unwrap(), vec![b"Y".to_vec()]);
    assert_eq!(s.schedule_size().await.unwrap(), 0);
}

pub async fn schedule_accepts_local_times<S: TaskStorage>(s: &S) {
    let t = Utc::now();
    let past_local = (t - Duration::seconds(30))
        .with_timezone(&chrono::Local)
        .naive_local();
    s.add_to_schedule(b"local", past_local, false).await.unwrap();

    assert_eq!(s.read_schedule(t).await.unwrap(), vec![b"local".to_vec()]);
}

pub async fn scheduled_items_orders_by_eligibility<S: TaskStorage>(s: &S) {
    let t = Utc::now();
    for (data, offset) in [(b"c", 30), (b"a", 10), (b"b", 20)] {
        s.add_to_schedule(data, (t + Duration::seconds(offset)).naive_utc(), true)
            .await
            .unwrap();
    }

    let items = s.scheduled_items(None).await.unwrap();
    assert_eq!(items, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    assert_eq!(s.scheduled_items(Some(1)).await.unwrap(), vec![b"a".to_vec()]);
    assert_eq!(s.schedule_size().await.unwrap(), 3);
}

pub async fn concurrent_drains_deliver_each_item_once<S: TaskStorage + 'static>(s: Arc<S>) {
    let past = (Utc::now() - Duration::seconds(5)).naive_utc();
    for i in 0..40u32 {
        s.add_to_schedule(&i.to_be_bytes(), past, true).await.unwrap();
    }

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let s = Arc::clone(&s);
            tokio::spawn(async move { s.read_schedule(Utc::now()).await.unwrap() })
        })
        .collect();

    let mut all = Vec::new();
    for h in handles {
        all.extend(h.await.unwrap());
    }
    all.sort();
    let mut expected: Vec<Vec<u8>> = (0..40u32).map(|i| i.to_be_bytes().to_vec()).collect();
    expected.sort();
    assert_eq!(all, expected);
}

pub async fn put_if_absent_keeps_first_writer<S: TaskStorage>(s: &S) {
    assert!(s.put_if_absent("k", b"v1").await.unwrap());
    assert!(!s.put_if_absent("k", b"v2").await.unwrap());
    assert_eq!(s.peek("k").await.unwrap(), Some(b"v1".to_vec()));
}

pub async fn concurrent_put_if_absent_has_one_winner<S: TaskStorage + 'static>(s: Arc<S>) {
    let handles: Vec<_> = (0..8u8)
        .map(|i| {
            let s = Arc::clone(&s);
            tokio::spawn(async move { (i, s.put_if_absent("lock", &[i]).await.unwrap()) })
        })
        .collect();

    let mut winners = Vec::new();
    for h in handles {
        let (i, won) = h.await.unwrap();
        if won {
            winners.push(i);
        }
    }
    assert_eq!(winners.len(), 1);
    assert_eq!(s.peek("lock").await.unwrap(), Some(vec![winners[0]]));
}

pub async fn pop_removes_value<S: TaskStorage>(s: &S) {
    s.put("result", b"42").await.unwrap();
    assert_eq!(s.pop("result").await.unwrap(), Some(b"42".to_vec()));
    assert_eq!(s.peek("result").await.unwrap(), None);
    assert_eq!(s.pop("result").await.unwrap(), None);
    assert!(!s.has_key("result").await.unwrap());
}

pub async fn empty_value_is_not_absence<S: TaskStorage>(s: &S) {
    s.put("blank", b"").await.unwrap();
    assert_eq!(s.peek("blank").await.unwrap(), Some(Vec::new()));
    assert!(s.has_key("blank").await.unwrap());
    assert_eq!(s.peek("missing").await.unwrap(), None);
    assert!(!s.has_key("missing").await.unwrap());
}

pub async fn put_replaces_and_lists_items<S: TaskStorage>(s: &S) {
    s.put("a", b"1").await.unwrap();
    s.put("b", b"2").await.unwrap();
    s.put("a", b"3").await.unwrap();

    assert_eq!(s.result_store_size().await.unwrap(), 2);
    let expected = HashMap::from([
        ("a".to_string(), b"3".to_vec()),
        ("b".to_string(), b"2".to_vec()),
    ]);
    assert_eq!(s.result_items().await.unwrap(), expected);

    assert_eq!(s.flush_results().await.unwrap(), 2);
    assert!(s.result_items().await.unwrap().is_empty());
}

pub async fn flush_is_scoped_to_partition<S: TaskStorage>(flushed: &S, kept: &S) {
    let later = (Utc::now() + Duration::hours(1)).naive_utc();
    for s in [flushed, kept] {
        s.enqueue(b"q", 0).await.unwrap();
        s.add_to_schedule(b"s", later, true).await.unwrap();
        s.put("k", b"v").await.unwrap();
    }

    let removed = flushed.flush_all().await.unwrap();
    assert_eq!((removed.queued, removed.scheduled, removed.results), (1, 1, 1));

    let stats = flushed.stats().await.unwrap();
    assert_eq!((stats.queued, stats.scheduled, stats.results), (0, 0, 0));

    let stats = kept.stats().await.unwrap();
    assert_eq!((stats.queued, stats.scheduled, stats.results), (1, 1, 1));
    assert_eq!(kept.peek("k").await.unwrap(), Some(b"v".to_vec()));
}

/// Log output shared with a `tracing_subscriber` fmt writer.
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Every operation reports its outcome, including put_if_absent conflicts.
///
/// Must run on a current-thread runtime: the subscriber is thread-local.
pub async fn every_operation_is_recorded<S: TaskStorage>(s: &S) {
    let captured = Captured::default();
    let writer = captured.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .without_time()
        .with_writer(move || writer.clone())
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let later = (Utc::now() + Duration::hours(1)).naive_utc();
    s.enqueue(b"q", 0).await.unwrap();
    s.dequeue().await.unwrap();
    s.queue_size().await.unwrap();
    s.enqueued_items(None).await.unwrap();
    s.flush_queue().await.unwrap();
    s.add_to_schedule(b"s", later, true).await.unwrap();
    s.read_schedule(Utc::now()).await.unwrap();
    s.schedule_size().await.unwrap();
    s.scheduled_items(None).await.unwrap();
    s.flush_schedule().await.unwrap();
    s.put("k", b"v").await.unwrap();
    s.peek("k").await.unwrap();
    s.has_key("k").await.unwrap();
    s.put_if_absent("k", b"w").await.unwrap();
    s.pop("k").await.unwrap();
    s.result_store_size().await.unwrap();
    s.result_items().await.unwrap();
    s.flush_results().await.unwrap();

    let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    let recorded = output
        .lines()
        .filter(|line| line.contains("storage operation finished"))
        .count();
    assert_eq!(recorded, 18, "{output}");
    assert!(
        output
            .lines()
            .any(|line| line.contains("put_if_absent") && line.contains("conflict")),
        "{output}"
    );
}
