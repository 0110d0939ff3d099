//! Storage operation span and metric helpers.

use super::metrics;
use opentelemetry::KeyValue;
use std::time::Instant;
use tracing::Span;

/// Start a span for one storage operation on a partition.
pub fn start_store_span(store: &'static str, operation: &'static str, queue: &str) -> Span {
    tracing::debug_span!(
        "taskstore.op",
        "store" = store,
        "operation" = operation,
        "queue" = queue,
    )
}

/// Count a finished operation and record how long it took.
pub fn record_operation(
    store: &'static str,
    operation: &'static str,
    outcome: &'static str,
    started: Instant,
) {
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
    metrics::store_operations().add(
        1,
        &[
            KeyValue::new("store", store),
            KeyValue::new("operation", operation),
            KeyValue::new("outcome", outcome),
        ],
    );
    metrics::operation_duration_ms().record(
        elapsed_ms,
        &[
            KeyValue::new("store", store),
            KeyValue::new("operation", operation),
        ],
    );
    tracing::trace!(store, operation, outcome, elapsed_ms, "storage operation finished");
}
