use clap::{Parser, ValueEnum};
use hdrhistogram::Histogram;
use reqwest::Client;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// --- CLI ---

/// Fire concurrent requests at blockdemo's query endpoints and report latency percentiles.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server base URL
    #[arg(long, env = "LOADGEN_BASE_URL", default_value = "http://localhost:3001")]
    base_url: String,

    /// Which endpoint(s) to exercise; `both` runs slow first, then fast
    #[arg(long, value_enum, default_value_t = Target::Both)]
    target: Target,

    /// Requests in flight at once
    #[arg(short = 'c', long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    concurrency: u32,

    /// Total requests per endpoint
    #[arg(short = 'n', long, default_value_t = 200, value_parser = clap::value_parser!(u32).range(1..))]
    requests: u32,

    /// Per-request timeout in seconds; a timed out request counts as failed
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Target {
    Slow,
    Fast,
    Both,
}

impl Target {
    fn endpoints(self) -> &'static [&'static str] {
        match self {
            Target::Slow => &["slow"],
            Target::Fast => &["fast"],
            Target::Both => &["slow", "fast"],
        }
    }
}

// --- Data Models ---

#[derive(Debug)]
struct BenchmarkConfig {
    url: String,
    concurrency: u32,
    requests: u32,
}

#[derive(Serialize, Clone, Debug)]
struct BenchmarkResults {
    total_time_seconds: f64,
    requests_per_second: f64,
    total_requests: u32,
    successful_requests: u32,
    failed_requests: u32,
    p50_latency_ms: u64,
    p90_latency_ms: u64,
    p99_latency_ms: u64,
    min_latency_ms: u64,
    max_latency_ms: u64,
    avg_latency_ms: f64,
}

// --- Main Application ---

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "loadgen=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let client = Client::builder().timeout(Duration::from_secs(args.timeout_secs)).build()?;
    let base_url = args.base_url.trim_end_matches('/');

    let mut report = BTreeMap::new();
    for endpoint in args.target.endpoints() {
        let config = BenchmarkConfig {
            url: format!("{base_url}/api/test/{endpoint}"),
            concurrency: args.concurrency,
            requests: args.requests,
        };
        tracing::info!("Benchmarking {} ({} requests, concurrency {})", config.url, config.requests, config.concurrency);

        let results = run_benchmark(&client, config).await?;
        tracing::info!(
            "{}: p50 {}ms, p99 {}ms, {} failed",
            endpoint,
            results.p50_latency_ms,
            results.p99_latency_ms,
            results.failed_requests
        );
        if let Some(warning) = failure_warning(&results) {
            tracing::warn!("{}: {}", endpoint, warning);
        }
        report.insert(*endpoint, results);
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Requests assigned to worker `index` when `total` requests are spread over `concurrency` workers
fn requests_for_worker(total: u32, concurrency: u32, index: u32) -> u32 {
    total / concurrency + if index < total % concurrency { 1 } else { 0 }
}

async fn run_benchmark(client: &Client, config: BenchmarkConfig) -> anyhow::Result<BenchmarkResults> {
    let (tx, mut rx) = mpsc::channel::<Duration>(config.requests as usize);
    let start_time = Instant::now();
    let url = Arc::new(config.url);

    let mut workers = vec![];
    for i in 0..config.concurrency {
        let client = client.clone();
        let url = url.clone();
        let tx = tx.clone();
        let num_requests = requests_for_worker(config.requests, config.concurrency, i);

        let worker = tokio::spawn(async move {
            let mut durations = vec![];
            for _ in 0..num_requests {
                let req_start = Instant::now();
                let res = client.get(url.as_str()).send().await;
                let duration = req_start.elapsed();
                match res {
                    Ok(response) if response.status().is_success() => durations.push(duration),
                    Ok(response) => tracing::debug!("Request failed with status {}", response.status()),
                    Err(e) => tracing::debug!("Request failed: {}", e),
                }
            }
            for duration in durations {
                if tx.send(duration).await.is_err() {
                    tracing::error!("Failed to send duration to channel");
                }
            }
        });
        workers.push(worker);
    }

    drop(tx);

    for worker in workers {
        worker.await.map_err(|e| anyhow::anyhow!("Worker task failed: {}", e))?;
    }

    let total_duration = start_time.elapsed();
    let mut durations = Vec::new();

    while let Some(duration) = rx.recv().await {
        durations.push(duration);
    }

    let total_requests = config.requests;
    tokio::task::spawn_blocking(move || summarize(&durations, total_requests, total_duration)).await?
}

/// Message for a run with failed requests, `None` when every request succeeded
fn failure_warning(results: &BenchmarkResults) -> Option<String> {
    (results.failed_requests > 0).then(|| {
        format!(
            "{} of {} requests failed or returned a non-2xx status; check the server logs and database configuration",
            results.failed_requests, results.total_requests
        )
    })
}

fn summarize(durations: &[Duration], total_requests: u32, total_duration: Duration) -> anyhow::Result<BenchmarkResults> {
    let mut latencies = Histogram::<u64>::new(3)?;
    for duration in durations {
        latencies.record(duration.as_millis() as u64)?;
    }

    let successful_requests = durations.len() as u32;

    Ok(BenchmarkResults {
        total_time_seconds: total_duration.as_secs_f64(),
        requests_per_second: successful_requests as f64 / total_duration.as_secs_f64(),
        total_requests,
        successful_requests,
        failed_requests: total_requests - successful_requests,
        p50_latency_ms: latencies.value_at_percentile(50.0),
        p90_latency_ms: latencies.value_at_percentile(90.0),
        p99_latency_ms: latencies.value_at_percentile(99.0),
        min_latency_ms: latencies.min(),
        max_latency_ms: latencies.max(),
        avg_latency_ms: latencies.mean(),
    })
}
