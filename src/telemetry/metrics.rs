//! Metric instrument factories for taskstore.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"taskstore"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for taskstore instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("taskstore")
}

/// Counter: storage operations.
/// Labels: `store` ("queue" | "schedule" | "kv"), `operation`,
/// `outcome` ("ok" | "empty" | "conflict").
pub fn store_operations() -> Counter<u64> {
    meter()
        .u64_counter("taskstore.operations")
        .with_description("Number of storage operations")
        .build()
}

/// Histogram: operation duration in milliseconds.
/// Labels: `store`, `operation`.
pub fn operation_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskstore.operation.duration_ms")
        .with_description("Storage operation duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: `put_if_absent` calls that found the key already taken.
/// Labels: `store`.
pub fn put_if_absent_conflicts() -> Counter<u64> {
    meter()
        .u64_counter("taskstore.put_if_absent.conflicts")
        .with_description("put_if_absent calls that lost to an existing entry")
        .build()
}
