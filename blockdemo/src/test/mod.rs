use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use axum::http::StatusCode;

use crate::{
    AppState, Application, build_router,
    metrics::{LatencyRecorder, PrometheusLatencySink},
    query::{BlockingRunner, NonBlockingRunner},
    test_utils::{
        ScriptedDatabase, blocking_runner, create_test_config, create_test_server, non_blocking_runner, widget_rows,
    },
};

#[tokio::test]
async fn test_healthz() {
    let server = create_test_server(&ScriptedDatabase::new(widget_rows()));

    let response = server.get("/healthz").await;

    response.assert_status(StatusCode::OK);
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn test_openapi_document_lists_both_endpoints() {
    let server = create_test_server(&ScriptedDatabase::new(widget_rows()));

    let response = server.get("/api-docs/openapi.json").await;
    response.assert_status(StatusCode::OK);
    let content = response.text();
    assert!(content.contains("\"openapi\""));
    assert!(content.contains("/test/slow"));
    assert!(content.contains("/test/fast"));

    server.get("/docs").await.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn test_build_router_with_metrics_disabled() {
    let server = create_test_server(&ScriptedDatabase::new(widget_rows()));

    let response = server.get("/internal/metrics").expect_failure().await;

    response.assert_status(StatusCode::NOT_FOUND);
}

#[test_log::test(tokio::test)]
async fn test_build_router_with_metrics_enabled() {
    let db = ScriptedDatabase::new(widget_rows());
    let latency_metrics = PrometheusLatencySink::new(&prometheus::Registry::new()).unwrap();
    let recorder = LatencyRecorder::new(Arc::new(latency_metrics.clone()));

    let mut config = create_test_config();
    config.enable_metrics = true;
    let state = AppState::builder()
        .blocking(BlockingRunner::new(
            db.connection_strings(),
            Arc::new(db.clone()),
            recorder.clone(),
            Duration::ZERO,
        ))
        .non_blocking(NonBlockingRunner::new(
            db.connection_strings(),
            Arc::new(db.clone()),
            recorder,
            Duration::ZERO,
        ))
        .latency_metrics(latency_metrics)
        .config(config)
        .build();
    let server = axum_test::TestServer::new(build_router(&state).unwrap()).unwrap();

    server.get("/api/test/slow").await.assert_status(StatusCode::OK);
    server.get("/api/test/fast").await.assert_status(StatusCode::OK);
    server.get("/api/test/fast").await.assert_status(StatusCode::OK);

    let response = server.get("/internal/metrics").await;
    response.assert_status(StatusCode::OK);
    let content = response.text();
    assert!(content.contains("# TYPE query_latency_milliseconds histogram"));
    assert!(content.contains("query_latency_milliseconds_count{execution_model=\"blocking\"} 1"));
    assert!(content.contains("query_latency_milliseconds_count{execution_model=\"suspending\"} 2"));
}

/// The server starts without any database settings; only the query endpoints fail.
#[test_log::test(tokio::test)]
async fn test_application_starts_without_database_configuration() {
    let mut config = create_test_config();
    config.connection_string_base = None;
    config.database_password = None;

    let server = Application::new(config).await.unwrap().into_test_server();

    server.get("/healthz").await.assert_status(StatusCode::OK);
    for path in ["/api/test/slow", "/api/test/fast"] {
        let response = server.get(path).expect_failure().await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.text(), "Database is not configured", "{path}");
    }
}

// ===== Worker pool behaviour =====

const REQUESTS: usize = 6;
const POST_QUERY_DELAY: Duration = Duration::from_millis(100);

/// Two workers, six concurrent blocking requests: at most two can be in flight at once, so the
/// batch needs at least three rounds of the post-query delay.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_requests_queue_behind_saturated_workers() {
    let db = ScriptedDatabase::new(widget_rows());
    let runner = blocking_runner(&db, POST_QUERY_DELAY);

    let started = Instant::now();
    let handles: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run_blocking() })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let total = started.elapsed();

    assert!(total >= POST_QUERY_DELAY * 3, "took {total:?}");
    assert_eq!(db.recorded(), REQUESTS);
}

/// Same load against the suspending runner: every request waits concurrently.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_non_blocking_requests_overlap_on_saturated_workers() {
    let db = ScriptedDatabase::new(widget_rows());
    let runner = non_blocking_runner(&db, POST_QUERY_DELAY);

    let started = Instant::now();
    let handles: Vec<_> = (0..REQUESTS)
        .map(|_| {
            let runner = runner.clone();
            tokio::spawn(async move { runner.run_non_blocking().await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    let total = started.elapsed();

    assert!(total >= POST_QUERY_DELAY);
    assert!(total < POST_QUERY_DELAY * 3, "took {total:?}");
    assert_eq!(db.recorded(), REQUESTS);
}
