//! Query latency telemetry.
//!
//! Runners hand every measurement to a [`LatencyRecorder`], which forwards it to a
//! [`LatencySink`]. With metrics enabled the sink is a Prometheus histogram exposed at
//! `/internal/metrics`; otherwise measurements are only logged.

mod latency;

pub use latency::{LatencyRecorder, LatencySink, LogLatencySink, PrometheusLatencySink};
