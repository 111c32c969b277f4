//! Database access seams for the two execution models.
//!
//! A connection is opened, runs exactly one statement through a cursor, and is closed. The
//! blocking traits return only once the database round-trip has finished, so the calling thread is
//! held for the whole wait. The async traits return futures that yield the worker at every I/O
//! boundary.
//!
//! [`postgres`] provides the sqlx-backed implementations used by the server; tests substitute
//! scripted connectors from `test_utils`.

pub mod errors;
pub mod postgres;

use async_trait::async_trait;

use crate::query::{ResultRow, connection_string::ConnectionString};
use errors::Result;

pub use errors::QueryError;

/// Opens connections whose every operation occupies the calling thread.
pub trait BlockingConnector: Send + Sync {
    fn open(&self, connection_string: &ConnectionString) -> Result<Box<dyn BlockingConnection>>;
}

/// An open connection driven synchronously.
pub trait BlockingConnection: Send {
    /// Send the statement and return a cursor over its rows.
    fn execute(&mut self, sql: &'static str) -> Result<Box<dyn BlockingCursor + '_>>;

    /// Tear the connection down.
    fn close(self: Box<Self>) -> Result<()>;
}

pub trait BlockingCursor {
    /// Next row, or `None` once the result set is exhausted.
    fn next_row(&mut self) -> Result<Option<ResultRow>>;
}

/// Opens connections whose operations suspend instead of blocking.
#[async_trait]
pub trait AsyncConnector: Send + Sync {
    async fn open(&self, connection_string: &ConnectionString) -> Result<Box<dyn AsyncConnection>>;
}

#[async_trait]
pub trait AsyncConnection: Send {
    async fn execute<'a>(&'a mut self, sql: &'static str) -> Result<Box<dyn AsyncCursor + 'a>>;

    async fn close(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait AsyncCursor: Send {
    async fn next_row(&mut self) -> Result<Option<ResultRow>>;
}
