//! Prometheus metrics for the RAG assistant.
//!
//! Exposes:
//! - `hr_rag_command_duration_seconds` (histogram)
//! - `hr_rag_command_total` (counter with status)
//! - `hr_rag_command_inflight` (gauge)
//! - `hr_rag_agent_queries_total` (counter with transport)
//! - `hr_rag_merges_total` (counter with outcome)
//! - `hr_rag_ingested_documents_total` (counter)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, Encoder, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static COMMAND_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    // Exponential buckets from 50ms up to ~3 minutes.
    let buckets =
        prometheus::exponential_buckets(0.05, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram_vec!(
        "hr_rag_command_duration_seconds",
        "CLI command duration in seconds",
        &["command"],
        buckets
    )
    .expect("failed to register command duration histogram")
});

static COMMAND_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hr_rag_command_total",
        "Total command executions by status",
        &["command", "status"]
    )
    .expect("failed to register command counter")
});

static COMMAND_INFLIGHT: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "hr_rag_command_inflight",
        "Number of in-flight commands",
        &["command"]
    )
    .expect("failed to register inflight gauge")
});

static AGENT_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hr_rag_agent_queries_total",
        "Agent queries by transport and status",
        &["transport", "status"]
    )
    .expect("failed to register agent query counter")
});

static MERGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "hr_rag_merges_total",
        "Curation merge requests by outcome",
        &["outcome"]
    )
    .expect("failed to register merge counter")
});

static INGESTED_DOCS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "hr_rag_ingested_documents_total",
        "Documents ingested into the knowledge store"
    )
    .expect("failed to register ingest counter")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&COMMAND_DURATION);
    Lazy::force(&COMMAND_TOTAL);
    Lazy::force(&COMMAND_INFLIGHT);
    Lazy::force(&AGENT_QUERIES);
    Lazy::force(&MERGES_TOTAL);
    Lazy::force(&INGESTED_DOCS);
}

/// Increment inflight gauge for a command.
pub fn record_command_start(command: &'static str) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).inc();
}

/// Record command completion with duration and status.
pub fn record_command_result(command: &'static str, duration: Duration, success: bool) {
    init_collectors();
    COMMAND_INFLIGHT.with_label_values(&[command]).dec();
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration.as_secs_f64());
    COMMAND_TOTAL
        .with_label_values(&[command, if success { "ok" } else { "error" }])
        .inc();
}

/// Count one agent query (transport: "http" | "ws" | "cli").
pub fn record_agent_query(transport: &'static str, success: bool) {
    init_collectors();
    AGENT_QUERIES
        .with_label_values(&[transport, if success { "ok" } else { "error" }])
        .inc();
}

/// Count one curation pair outcome ("merged" | "skipped_below_threshold" |
/// "failed").
pub fn record_merge_outcome(outcome: &str) {
    init_collectors();
    MERGES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Count ingested documents.
pub fn record_ingested_documents(count: u64) {
    init_collectors();
    INGESTED_DOCS.inc_by(count);
}

/// Encode all registered metrics in Prometheus text format.
pub fn gather_text() -> Result<(String, String), prometheus::Error> {
    init_collectors();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    let body = String::from_utf8(buffer).unwrap_or_default();
    Ok((encoder.format_type().to_string(), body))
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    match gather_text() {
        Ok((content_type, body)) => Ok(Response::builder()
            .status(StatusCode::OK)
            .header(hyper::header::CONTENT_TYPE, content_type)
            .body(Full::from(body))
            .unwrap()),
        Err(err) => {
            error!("Failed to encode metrics: {}", err);
            Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::from("encode error"))
                .unwrap())
        }
    }
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .unwrap()),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_successful_command_metrics() {
        let cmd = "test_command_metrics_success";

        record_command_start(cmd);
        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 1);

        record_command_result(cmd, Duration::from_millis(120), true);

        assert_eq!(COMMAND_INFLIGHT.with_label_values(&[cmd]).get(), 0);
        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "ok"]).get(), 1);
        assert_eq!(
            COMMAND_DURATION
                .with_label_values(&[cmd])
                .get_sample_count(),
            1
        );
    }

    #[test]
    fn records_failed_command_metrics() {
        let cmd = "test_command_metrics_error";

        record_command_start(cmd);
        record_command_result(cmd, Duration::from_secs(2), false);

        assert_eq!(COMMAND_TOTAL.with_label_values(&[cmd, "error"]).get(), 1);
    }

    #[test]
    fn merge_outcomes_tracked_by_label() {
        record_merge_outcome("merged");
        record_merge_outcome("merged");
        record_merge_outcome("failed");

        assert!(MERGES_TOTAL.with_label_values(&["merged"]).get() >= 2);
        assert!(MERGES_TOTAL.with_label_values(&["failed"]).get() >= 1);
    }

    #[test]
    fn agent_queries_tracked_by_transport() {
        record_agent_query("http", true);
        record_agent_query("ws", false);

        assert!(AGENT_QUERIES.with_label_values(&["http", "ok"]).get() >= 1);
        assert!(AGENT_QUERIES.with_label_values(&["ws", "error"]).get() >= 1);
    }

    #[test]
    fn gather_text_contains_registered_metrics() {
        record_ingested_documents(3);

        let (content_type, body) = gather_text().expect("gather");
        assert!(content_type.contains("text/plain"));
        assert!(body.contains("hr_rag_ingested_documents_total"));
        assert!(body.contains("hr_rag_command_total"));
    }

    #[test]
    fn init_collectors_can_be_called_multiple_times() {
        init_collectors();
        init_collectors();
        // Should not panic
    }
}
