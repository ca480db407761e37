//! Prometheus metrics for the submission queue.

pub mod prometheus;

pub use self::prometheus::{Metrics, MetricsServer};
