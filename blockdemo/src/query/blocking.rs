use std::{sync::Arc, thread, time::Duration, time::Instant};

use tracing::{debug, instrument};

use super::{ConnectionStringBuilder, ExecutionModel, QUERY, QueryOutcome, ResultRow, ResultSet, settle};
use crate::db::{BlockingConnection, BlockingConnector, QueryError};
use crate::errors::Result;
use crate::metrics::LatencyRecorder;

/// Runs [`QUERY`] while holding the calling thread for every wait, including the post-query delay.
///
/// Called from an async handler, this keeps a runtime worker out of circulation for the whole
/// request.
#[derive(Clone)]
pub struct BlockingRunner {
    connection_strings: ConnectionStringBuilder,
    connector: Arc<dyn BlockingConnector>,
    recorder: LatencyRecorder,
    post_query_delay: Duration,
}

impl BlockingRunner {
    pub const EXECUTION_MODEL: ExecutionModel = ExecutionModel::Blocking;

    pub fn new(
        connection_strings: ConnectionStringBuilder,
        connector: Arc<dyn BlockingConnector>,
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
    pub fn run_blocking(&self) -> Result<QueryOutcome> {
        let connection_string = self.connection_strings.build()?;

        let started = Instant::now();
        let mut connection = self.connector.open(&connection_string)?;
        let fetched = read_all(connection.as_mut());
        let closed = connection.close();
        let results = settle(Self::EXECUTION_MODEL, fetched, closed)?;
        let elapsed = started.elapsed();

        self.recorder.record(Self::EXECUTION_MODEL, elapsed);
        debug!(rows = results.len(), elapsed_ms = elapsed.as_millis() as u64, "Query complete");

        thread::sleep(self.post_query_delay);

        Ok(QueryOutcome { results, elapsed })
    }
}

fn read_all(connection: &mut dyn BlockingConnection) -> std::result::Result<ResultSet, QueryError> {
    let mut cursor = connection.execute(QUERY)?;
    let mut rows: Vec<ResultRow> = Vec::new();
    while let Some(row) = cursor.next_row()? {
        rows.push(row);
    }
    Ok(ResultSet::from(rows))
}
