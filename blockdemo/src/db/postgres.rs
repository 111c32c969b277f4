//! PostgreSQL connectors backed by sqlx.
//!
//! Both connectors issue the same sqlx calls against a dedicated [`PgConnection`] per request; no
//! pool sits in between. [`PgAsyncConnector`] awaits them. [`PgBlockingConnector`] waits for each
//! one on the calling thread, the way a synchronous client library would.

use std::future::Future;

use async_trait::async_trait;
use futures::{TryStreamExt, executor, stream::BoxStream};
use sqlx::{Connection, PgConnection};
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use super::{
    AsyncConnection, AsyncConnector, AsyncCursor, BlockingConnection, BlockingConnector, BlockingCursor,
    errors::{QueryError, Result},
};
use crate::query::{ResultRow, connection_string::ConnectionString};

type RowStream<'a> = BoxStream<'a, std::result::Result<(String, String), sqlx::Error>>;

/// Connector whose operations are awaited on the request's own task.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgAsyncConnector;

#[async_trait]
impl AsyncConnector for PgAsyncConnector {
    async fn open(&self, connection_string: &ConnectionString) -> Result<Box<dyn AsyncConnection>> {
        let conn = PgConnection::connect(connection_string.expose())
            .await
            .map_err(|e| QueryError::Open(e.into()))?;
        Ok(Box::new(PgAsyncConnection { conn }))
    }
}

struct PgAsyncConnection {
    conn: PgConnection,
}

#[async_trait]
impl AsyncConnection for PgAsyncConnection {
    async fn execute<'a>(&'a mut self, sql: &'static str) -> Result<Box<dyn AsyncCursor + 'a>> {
        let mut rows: RowStream<'a> = sqlx::query_as::<_, (String, String)>(sql).fetch(&mut self.conn);
        // sqlx sends the statement on first poll; pull the first row so statement errors surface here
        let first = rows.try_next().await.map_err(|e| QueryError::Execute(e.into()))?;
        Ok(Box::new(PgCursor::new(rows, first)))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.conn.close().await.map_err(|e| QueryError::Close(e.into()))
    }
}

/// Connector whose operations hold the calling thread until the database answers.
///
/// The sqlx futures are driven with [`futures::executor::block_on`] on whichever thread calls in,
/// request workers included. Socket readiness is dispatched by a private single-threaded driver
/// runtime, so a request worker parked here never depends on another request worker to make
/// progress: when every worker is busy the server queues, it does not deadlock.
pub struct PgBlockingConnector {
    handle: Handle,
    driver: Option<Runtime>,
}

impl PgBlockingConnector {
    pub fn new() -> anyhow::Result<Self> {
        let driver = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("blocking-pg-driver")
            .enable_all()
            .build()?;
        Ok(Self {
            handle: driver.handle().clone(),
            driver: Some(driver),
        })
    }
}

impl Drop for PgBlockingConnector {
    fn drop(&mut self) {
        // Dropping a runtime from inside an async context panics
        if let Some(driver) = self.driver.take() {
            driver.shutdown_background();
        }
    }
}

impl BlockingConnector for PgBlockingConnector {
    fn open(&self, connection_string: &ConnectionString) -> Result<Box<dyn BlockingConnection>> {
        let conn = wait(&self.handle, PgConnection::connect(connection_string.expose())).map_err(|e| QueryError::Open(e.into()))?;
        debug!("Blocking connection established");
        Ok(Box::new(PgBlockingConnection {
            conn,
            driver: self.handle.clone(),
        }))
    }
}

struct PgBlockingConnection {
    conn: PgConnection,
    driver: Handle,
}

impl BlockingConnection for PgBlockingConnection {
    fn execute(&mut self, sql: &'static str) -> Result<Box<dyn BlockingCursor + '_>> {
        let driver = &self.driver;
        let mut rows: RowStream<'_> = sqlx::query_as::<_, (String, String)>(sql).fetch(&mut self.conn);
        let first = wait(driver, rows.try_next()).map_err(|e| QueryError::Execute(e.into()))?;
        Ok(Box::new(PgBlockingCursor {
            cursor: PgCursor::new(rows, first),
            driver,
        }))
    }

    fn close(self: Box<Self>) -> Result<()> {
        let this = *self;
        wait(&this.driver, this.conn.close()).map_err(|e| QueryError::Close(e.into()))
    }
}

struct PgBlockingCursor<'a> {
    cursor: PgCursor<'a>,
    driver: &'a Handle,
}

impl BlockingCursor for PgBlockingCursor<'_> {
    fn next_row(&mut self) -> Result<Option<ResultRow>> {
        wait(self.driver, self.cursor.next())
    }
}

/// Row stream with the row already pulled by `execute` pushed back in front.
struct PgCursor<'a> {
    rows: RowStream<'a>,
    peeked: Option<ResultRow>,
    exhausted: bool,
}

impl<'a> PgCursor<'a> {
    fn new(rows: RowStream<'a>, first: Option<(String, String)>) -> Self {
        Self {
            rows,
            exhausted: first.is_none(),
            peeked: first.map(ResultRow::from),
        }
    }

    async fn next(&mut self) -> Result<Option<ResultRow>> {
        if let Some(row) = self.peeked.take() {
            return Ok(Some(row));
        }
        if self.exhausted {
            return Ok(None);
        }
        match self.rows.try_next().await.map_err(|e| QueryError::Fetch(e.into()))? {
            Some(row) => Ok(Some(row.into())),
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl AsyncCursor for PgCursor<'_> {
    async fn next_row(&mut self) -> Result<Option<ResultRow>> {
        self.next().await
    }
}

/// Run `fut` to completion on the calling thread, with `driver` as the ambient tokio context so
/// sockets and timers register with the driver runtime.
fn wait<F: Future>(driver: &Handle, fut: F) -> F::Output {
    let _context = driver.enter();
    executor::block_on(fut)
}
