//! The product catalogue query and the two runners that execute it.
//!
//! [`BlockingRunner`] and [`NonBlockingRunner`] perform the same steps against the same
//! [`QUERY`] and produce the same [`ResultSet`]. They differ only in their [`ExecutionModel`]:
//! the blocking runner keeps its worker thread for the whole request, while the non-blocking one
//! hands the worker back to the scheduler at every I/O wait.

pub mod blocking;
pub mod connection_string;
pub mod non_blocking;

use std::{fmt, time::Duration};

use serde::{Serialize, Serializer};
use tracing::warn;

use crate::db::QueryError;

pub use blocking::BlockingRunner;
pub use connection_string::{ConnectionString, ConnectionStringBuilder};
pub use non_blocking::NonBlockingRunner;

/// Product names with their category names. Both runners execute this exact text.
pub const QUERY: &str = "SELECT product.name, category.name \
     FROM saleslt.product AS product \
     JOIN saleslt.productcategory AS category \
     ON product.productcategoryid = category.productcategoryid";

/// How a runner treats its worker while it waits on I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionModel {
    /// The worker thread is occupied for the full duration of every wait
    Blocking,
    /// The task yields the worker at each wait and is resumed on completion
    Suspending,
}

impl ExecutionModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionModel::Blocking => "blocking",
            ExecutionModel::Suspending => "suspending",
        }
    }
}

impl fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the catalogue query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub item: String,
    pub category: String,
}

impl ResultRow {
    pub fn new(item: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            category: category.into(),
        }
    }
}

impl From<(String, String)> for ResultRow {
    fn from((item, category): (String, String)) -> Self {
        Self { item, category }
    }
}

/// Renders as `<item> (<category>)`.
impl fmt::Display for ResultRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.item, self.category)
    }
}

/// Rows in the order the database cursor produced them. Serializes as a JSON array of rendered
/// rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    rows: Vec<ResultRow>,
}

impl ResultSet {
    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn rendered(&self) -> Vec<String> {
        self.rows.iter().map(ToString::to_string).collect()
    }
}

impl From<Vec<ResultRow>> for ResultSet {
    fn from(rows: Vec<ResultRow>) -> Self {
        Self { rows }
    }
}

impl Serialize for ResultSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.rows.iter().map(ToString::to_string))
    }
}

/// What a runner hands back: the rows and the time spent between opening and closing the
/// connection. The post-query delay is not part of `elapsed`.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub results: ResultSet,
    pub elapsed: Duration,
}

/// Combine the fetch result with the close result. A close failure never hides a fetch failure
/// and never discards a complete result set.
pub(crate) fn settle(
    model: ExecutionModel,
    fetched: Result<ResultSet, QueryError>,
    closed: Result<(), QueryError>,
) -> Result<ResultSet, QueryError> {
    match (fetched, closed) {
        (fetched, Ok(())) => fetched,
        (Ok(results), Err(close_err)) => {
            warn!(execution_model = %model, error = %close_err, "Connection close failed after a complete read");
            Ok(results)
        }
        (Err(fetch_err), Err(close_err)) => {
            warn!(execution_model = %model, error = %close_err, "Connection close failed after a read failure");
            Err(fetch_err)
        }
    }
}
