//! Metrics Adapter - Prometheus Registry
//!
//! Counters and gauges for the lending workflows, crawls, the live
//! feed and settlements. Rendered by the HTTP server on `/metrics`.

pub mod prometheus;

pub use prometheus::MetricsRegistry;
