// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, TextEncoder, register_counter, register_gauge};

lazy_static! {
    // --- Server-wide Gauges ---
    /// The number of connections that have started and not yet stopped.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("spindle_connected_clients", "Number of currently connected clients.").unwrap();
    /// The number of handles currently reachable for fan-out. Refreshed on scrape.
    pub static ref REGISTERED_CONNECTIONS: Gauge =
        register_gauge!("spindle_registered_connections", "Number of connections in the fan-out registry.").unwrap();


    // --- Server-wide Counters ---
    /// The total number of connections accepted by the server since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("spindle_connections_received_total", "Total number of connections received.").unwrap();
    /// Connections closed immediately because `max_clients` was reached.
    pub static ref CONNECTIONS_REJECTED_TOTAL: Counter =
        register_counter!("spindle_connections_rejected_total", "Total number of connections rejected by the max_clients limit.").unwrap();
    pub static ref BYTES_READ_TOTAL: Counter =
        register_counter!("spindle_bytes_read_total", "Total number of payload bytes read from clients.").unwrap();
    pub static ref PARSE_ERRORS_TOTAL: Counter =
        register_counter!("spindle_parse_errors_total", "Total number of chunks rejected as malformed by a task.").unwrap();
    /// Write failures are discarded by the write path; this is their only trace.
    pub static ref WRITE_ERRORS_TOTAL: Counter =
        register_counter!("spindle_write_errors_total", "Total number of failed (and discarded) writes.").unwrap();
    pub static ref FANOUT_WRITES_TOTAL: Counter =
        register_counter!("spindle_fanout_writes_total", "Total number of writes issued by broadcast and unicast.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
