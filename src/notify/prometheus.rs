//! Prometheus metrics exporter.

use std::net::SocketAddr;
use std::sync::Arc;

use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};
use tracing::{error, info};

use crate::error::MetricsError;

/// Prometheus metrics for the submission queue.
pub struct Metrics {
    /// Registry for all metrics.
    registry: Registry,
    /// Number of entries waiting in the queue.
    pub queue_depth: Gauge,
    /// 1 while a submission is in flight.
    pub in_flight: Gauge,
    /// Submission attempts by outcome.
    pub submissions_total: CounterVec,
    /// Refused enqueues by reason.
    pub rejections_total: CounterVec,
    /// Answers coerced to a default value.
    pub coercions_total: CounterVec,
    /// Duration of individual submit calls.
    pub submit_duration_seconds: Histogram,
}

impl Metrics {
    /// Creates a new metrics instance with all gauges and counters registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let queue_depth = Gauge::new("answer_queue_depth", "Number of answers waiting in queue")?;

        let in_flight = Gauge::new(
            "answer_queue_in_flight",
            "Whether a submission is currently in flight",
        )?;

        let submissions_total = CounterVec::new(
            Opts::new(
                "answer_submissions_total",
                "Submission attempts by outcome (success, retry, error)",
            ),
            &["outcome"],
        )?;

        let rejections_total = CounterVec::new(
            Opts::new(
                "answer_enqueue_rejections_total",
                "Enqueue attempts refused by the queue",
            ),
            &["reason"],
        )?;

        let coercions_total = CounterVec::new(
            Opts::new(
                "answer_coercions_total",
                "Answers replaced by a default because they did not fit their type",
            ),
            &["question_type"],
        )?;

        let submit_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "answer_submit_duration_seconds",
                "Time taken by a single submit call in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;

        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(submissions_total.clone()))?;
        registry.register(Box::new(rejections_total.clone()))?;
        registry.register(Box::new(coercions_total.clone()))?;
        registry.register(Box::new(submit_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            queue_depth,
            in_flight,
            submissions_total,
            rejections_total,
            coercions_total,
            submit_duration_seconds,
        })
    }

    /// Records a finished attempt.
    pub fn record_attempt(&self, outcome: &str, duration_secs: f64) {
        self.submissions_total.with_label_values(&[outcome]).inc();
        self.submit_duration_seconds.observe(duration_secs);
    }

    /// Records a refused enqueue.
    pub fn record_rejection(&self, reason: &str) {
        self.rejections_total.with_label_values(&[reason]).inc();
    }

    /// Records a coerced answer.
    pub fn record_coercion(&self, question_type: &str) {
        self.coercions_total.with_label_values(&[question_type]).inc();
    }

    /// Updates the queue gauges.
    pub fn set_queue_state(&self, depth: usize, in_flight: bool) {
        self.queue_depth.set(depth as f64);
        self.in_flight.set(if in_flight { 1.0 } else { 0.0 });
    }

    /// Returns the metrics in Prometheus text format.
    pub fn gather(&self) -> Result<String, MetricsError> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| MetricsError::Export(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Export(e.to_string()))
    }
}

/// HTTP server for Prometheus metrics.
pub struct MetricsServer {
    /// Metrics instance.
    metrics: Arc<Metrics>,
    /// Port to listen on.
    port: u16,
}

impl MetricsServer {
    /// Creates a new metrics server.
    pub fn new(metrics: Arc<Metrics>, port: u16) -> Self {
        Self { metrics, port }
    }

    /// Starts the metrics HTTP server.
    pub async fn start(self) -> Result<(), MetricsError> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{body::Incoming, Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;

        let addr: SocketAddr = ([0, 0, 0, 0], self.port).into();
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| MetricsError::Server(e.to_string()))?;

        info!(port = self.port, "Starting Prometheus metrics server");

        let metrics = self.metrics.clone();

        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| MetricsError::Server(e.to_string()))?;

            let io = TokioIo::new(stream);
            let metrics = metrics.clone();

            tokio::spawn(async move {
                let service = service_fn(|req: Request<Incoming>| {
                    let metrics = metrics.clone();
                    async move {
                        let (status, body) = if req.uri().path() != "/metrics" {
                            (StatusCode::NOT_FOUND, "Not Found".to_string())
                        } else {
                            match metrics.gather() {
                                Ok(body) => (StatusCode::OK, body),
                                Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
                            }
                        };
                        let mut response = Response::new(Full::new(Bytes::from(body)));
                        *response.status_mut() = status;
                        Ok::<_, hyper::Error>(response)
                    }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!(error = %e, "Error serving connection");
                }
            });
        }
    }
}
