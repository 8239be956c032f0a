use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("course_gate_requests_total", "Total number of guarded requests").unwrap();
    pub static ref ADMITTED_TOTAL: Counter =
        register_counter!("course_gate_admitted_total", "Requests admitted by the rate limiter").unwrap();
    pub static ref REJECTED_TOTAL: Counter =
        register_counter!("course_gate_rejected_total", "Requests rejected with 429").unwrap();
    pub static ref TRACKED_CLIENTS: Gauge =
        register_gauge!("course_gate_tracked_clients", "Client windows currently held").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "course_gate_upstream_latency_seconds",
        "Upstream round trip latency in seconds"
    )
    .unwrap();
    pub static ref UPSTREAM_ERRORS: Counter =
        register_counter!("course_gate_upstream_errors_total", "Failed upstream requests").unwrap();
}
