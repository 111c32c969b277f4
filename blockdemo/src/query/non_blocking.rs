use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{debug, instrument};

use super::{ConnectionStringBuilder, ExecutionModel, QUERY, QueryOutcome, ResultRow, ResultSet, settle};
use crate::db::{AsyncConnection, AsyncConnector, QueryError};
use crate::errors::Result;
use crate::metrics::LatencyRecorder;

/// Runs [`QUERY`] with a suspension point at every wait: connection open, execute, each row fetch,
/// close and the post-query delay. The worker is free to serve other requests in between.
#[derive(Clone)]
pub struct NonBlockingRunner {
    connection_strings: ConnectionStringBuilder,
    connector: Arc<dyn AsyncConnector>,
    recorder: LatencyRecorder,
    post_query_delay: Duration,
}

impl NonBlockingRunner {
    pub const EXECUTION_MODEL: ExecutionModel = ExecutionModel::Suspending;

    pub fn new(
        connection_strings: ConnectionStringBuilder,
        connector: Arc<dyn AsyncConnector>,
        recorder: LatencyRecorder,
        post_query_delay: Duration,
    ) -> Self {
        Self {
            connection_strings,
            connector,
            recorder,
            post_query_delay,
        }
    }

    #[instrument(skip_all, fields(execution_model = %Self::EXECUTION_MODEL))]
    pub async fn run_non_blocking(&self) -> Result<QueryOutcome> {
        let connection_string = self.connection_strings.build()?;

        let started = Instant::now();
        let mut connection = self.connector.open(&connection_string).await?;
        let fetched = read_all(connection.as_mut()).await;
        let closed = connection.close().await;
        let results = settle(Self::EXECUTION_MODEL, fetched, closed)?;
        let elapsed = started.elapsed();

        self.recorder.record(Self::EXECUTION_MODEL, elapsed);
        debug!(rows = results.len(), elapsed_ms = elapsed.as_millis() as u64, "Query complete");

        tokio::time::sleep(self.post_query_delay).await;

        Ok(QueryOutcome { results, elapsed })
    }
}

async fn read_all(connection: &mut dyn AsyncConnection) -> std::result::Result<ResultSet, QueryError> {
    let mut cursor = connection.execute(QUERY).await?;
    let mut rows: Vec<ResultRow> = Vec::new();
    while let Some(row) = cursor.next_row().await? {
        rows.push(row);
    }
    Ok(ResultSet::from(rows))
}
