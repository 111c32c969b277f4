use std::{sync::Arc, time::Duration};

use prometheus::{HistogramOpts, HistogramVec, Registry};
use tracing::{debug, info, warn};

use crate::query::ExecutionModel;

/// Destination for latency measurements.
pub trait LatencySink: Send + Sync {
    fn record(&self, model: ExecutionModel, elapsed: Duration) -> anyhow::Result<()>;
}

/// Forwards measurements to a sink. Recording never fails the request: sink errors are logged and
/// dropped.
#[derive(Clone)]
pub struct LatencyRecorder {
    sink: Arc<dyn LatencySink>,
}

impl LatencyRecorder {
    pub fn new(sink: Arc<dyn LatencySink>) -> Self {
        Self { sink }
    }

    pub fn record(&self, model: ExecutionModel, elapsed: Duration) {
        debug!(execution_model = %model, elapsed_ms = millis(elapsed), "Recording query latency");
        if let Err(e) = self.sink.record(model, elapsed) {
            warn!(execution_model = %model, "Failed to record query latency: {:#}", e);
        }
    }
}

/// Query latency histogram, labelled by execution model.
#[derive(Clone)]
pub struct PrometheusLatencySink {
    query_latency: HistogramVec,
    registry: Registry,
}

impl PrometheusLatencySink {
    /// Create the histogram and register it with `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        // Milliseconds; the post-query delay is excluded so most samples land well under 100
        let buckets = vec![1.0, 2.5, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0];
        let query_latency = HistogramVec::new(
            HistogramOpts::new(
                "query_latency_milliseconds",
                "Time from opening the database connection to closing it, per request",
            )
            .buckets(buckets),
            &["execution_model"],
        )?;
        registry.register(Box::new(query_latency.clone()))?;

        Ok(Self {
            query_latency,
            registry: registry.clone(),
        })
    }

    /// Get reference to the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl LatencySink for PrometheusLatencySink {
    fn record(&self, model: ExecutionModel, elapsed: Duration) -> anyhow::Result<()> {
        self.query_latency
            .get_metric_with_label_values(&[model.as_str()])?
            .observe(millis(elapsed));
        Ok(())
    }
}

/// Sink used when metrics are disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLatencySink;

impl LatencySink for LogLatencySink {
    fn record(&self, model: ExecutionModel, elapsed: Duration) -> anyhow::Result<()> {
        info!(execution_model = %model, elapsed_ms = millis(elapsed), "Query latency");
        Ok(())
    }
}

fn millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}
