//! # blockdemo: blocking vs non-blocking database access on a fixed worker pool
//!
//! `blockdemo` serves one catalogue query (products joined to their categories) through two
//! endpoints that differ only in how they wait for the database:
//!
//! - `GET /api/test/slow` drives the connection synchronously. The runtime worker that picked up
//!   the request is held until the response is ready, post-query delay included.
//! - `GET /api/test/fast` awaits every database operation. The worker goes back to the pool while
//!   the request is waiting and can serve other requests.
//!
//! Both return the same JSON array of `"<product> (<category>)"` strings. Under concurrent load
//! the slow endpoint's latency climbs once the number of in-flight requests exceeds
//! [`Config::worker_threads`]; the fast endpoint's does not. The `loadgen` workspace member drives
//! that comparison.
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum) on a multi-threaded Tokio runtime
//! whose worker count comes from configuration. Requests flow through:
//!
//! 1. [`api::handlers::comparison`] extracts [`AppState`] and calls one of the runners
//! 2. [`query::BlockingRunner`] or [`query::NonBlockingRunner`] resolves the connection string,
//!    opens a connection, executes [`query::QUERY`], drains the cursor and closes the connection
//! 3. the elapsed time is handed to a [`metrics::LatencyRecorder`] before the post-query delay
//! 4. failures map onto [`errors::Error`], which renders as a 500 without leaking driver detail
//!
//! The database seams live in [`db`]: object-safe connector traits for each execution model, with
//! sqlx-backed Postgres implementations in [`db::postgres`].
//!
//! ## Configuration
//!
//! See [`config`] for the YAML file and `BLOCKDEMO_` environment overrides. The connection string
//! template and password are looked up per request, so a server with no database configured still
//! starts and answers `/healthz`.

pub mod api;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;
pub mod openapi;
pub mod query;
pub mod telemetry;

#[cfg(test)]
mod test;
#[cfg(test)]
pub mod test_utils;

use std::sync::Arc;

use axum::{Json, Router, routing::get};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use db::postgres::{PgAsyncConnector, PgBlockingConnector};
use metrics::{LatencyRecorder, LatencySink, LogLatencySink, PrometheusLatencySink};
use openapi::ApiDoc;
use query::{BlockingRunner, ConnectionStringBuilder, NonBlockingRunner};
use sqlx::{Connection, PgConnection};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .blocking(blocking_runner)
///     .non_blocking(non_blocking_runner)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub blocking: BlockingRunner,
    pub non_blocking: NonBlockingRunner,
    /// Present when `enable_metrics` is set; its registry is exposed at `/internal/metrics`
    pub latency_metrics: Option<PrometheusLatencySink>,
}

impl AppState {
    /// Wire both runners to the Postgres connectors and the configured latency sink.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let latency_metrics = if config.enable_metrics {
            Some(PrometheusLatencySink::new(&prometheus::Registry::new())?)
        } else {
            None
        };
        let sink: Arc<dyn LatencySink> = match &latency_metrics {
            Some(metrics) => Arc::new(metrics.clone()),
            None => Arc::new(LogLatencySink),
        };
        let recorder = LatencyRecorder::new(sink);

        let connection_strings = ConnectionStringBuilder::new(Arc::new(config.clone()));
        let blocking = BlockingRunner::new(
            connection_strings.clone(),
            Arc::new(PgBlockingConnector::new()?),
            recorder.clone(),
            config.post_query_delay,
        );
        let non_blocking = NonBlockingRunner::new(
            connection_strings,
            Arc::new(PgAsyncConnector),
            recorder,
            config.post_query_delay,
        );

        Ok(Self::builder()
            .config(config)
            .blocking(blocking)
            .non_blocking(non_blocking)
            .maybe_latency_metrics(latency_metrics)
            .build())
    }
}

/// Get the catalogue schema migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Apply the bundled migrations over a single connection built from the configured template.
#[instrument(skip_all, err)]
async fn run_migrations(config: &Config) -> anyhow::Result<()> {
    let connection_string = ConnectionStringBuilder::new(Arc::new(config.clone())).build()?;
    let mut conn = PgConnection::connect(connection_string.expose()).await?;
    migrator().run(&mut conn).await?;
    conn.close().await?;
    info!("Database migrations applied");
    Ok(())
}

/// Build the application router with all endpoints and middleware.
///
/// ## Routes
///
/// - `/healthz` - liveness check
/// - `/api/test/slow`, `/api/test/fast` - the catalogue query per execution model
/// - `/api-docs/openapi.json` and `/docs` - OpenAPI document and its Scalar UI
/// - `/internal/metrics` - Prometheus metrics (when enabled)
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/test/slow", get(api::handlers::comparison::get_slow))
        .route("/test/fast", get(api::handlers::comparison::get_fast))
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .nest("/api", api_routes);

    if let Some(latency_metrics) = &state.latency_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        let query_registry = latency_metrics.registry().clone();

        // HTTP metrics from axum-prometheus followed by the query latency histogram
        router = router
            .route(
                "/internal/metrics",
                get(|| async move {
                    use prometheus::{Encoder, TextEncoder};

                    let mut rendered = metric_handle.render();

                    let mut buffer = vec![];
                    match TextEncoder::new().encode(&query_registry.gather(), &mut buffer) {
                        Ok(()) => rendered.push_str(&String::from_utf8_lossy(&buffer)),
                        Err(e) => warn!("Failed to encode query latency metrics: {}", e),
                    }
                    rendered
                }),
            )
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct.
///
/// 1. **Create**: [`Application::new`] optionally runs migrations, then builds state and router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting with configuration: {:#?}", config);

        if config.run_migrations {
            run_migrations(&config).await?;
        }

        let app_state = AppState::from_config(config.clone())?;
        let router = build_router(&app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            worker_threads = self.config.worker_threads,
            post_query_delay_ms = self.config.post_query_delay.as_millis() as u64,
            "Listening on http://{}, available at http://localhost:{}",
            bind_addr,
            self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
