/// Prometheus metrics for the risk predictor.
///
/// All collectors live in one process-wide registry; `init_metrics` must be
/// called once at startup before `gather_metrics` reports anything.
///
/// # Example
/// ```no_run
/// use asset_risk_predictor::metrics::TRAINING_RUNS_TOTAL;
///
/// TRAINING_RUNS_TOTAL.with_label_values(&["success"]).inc();
/// ```
mod middleware;

pub use middleware::track_http;

use lazy_static::lazy_static;
use prometheus::{CounterVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry};

const NAMESPACE: &str = "asset_risk_predictor";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Total number of HTTP requests received
    ///
    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// HTTP request duration in seconds
    ///
    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // Training Metrics
    // ============================================================================

    /// Training workflow runs
    ///
    /// Labels: outcome (success, rejected, failed)
    pub static ref TRAINING_RUNS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("training_runs_total", "Total number of training runs")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create TRAINING_RUNS_TOTAL metric");

    /// Wall time of a successful training run, upload to persisted metadata
    pub static ref TRAINING_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("training_duration_seconds", "Training run duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    ).expect("Failed to create TRAINING_DURATION_SECONDS metric");

    // ============================================================================
    // Inference Metrics
    // ============================================================================

    /// Prediction workflow requests
    ///
    /// Labels: outcome (success, rejected, failed)
    pub static ref PREDICTION_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("prediction_requests_total", "Total number of prediction requests")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create PREDICTION_REQUESTS_TOTAL metric");

    /// Assessments produced
    ///
    /// Labels: risk_level
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of asset assessments produced")
            .namespace(NAMESPACE),
        &["risk_level"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Time spent loading the artifact and scoring the selected rows
    pub static ref INFERENCE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("inference_duration_seconds", "Inference duration in seconds")
            .namespace(NAMESPACE)
            .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    ).expect("Failed to create INFERENCE_DURATION_SECONDS metric");
}

/// Outcome label for a finished workflow
pub fn outcome_label<T>(result: &crate::error::Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) if e.is_client_error() => "rejected",
        Err(_) => "failed",
    }
}

/// Register every collector with the global registry.
///
/// Calling it twice is harmless.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(TRAINING_RUNS_TOTAL.clone()),
        Box::new(TRAINING_DURATION_SECONDS.clone()),
        Box::new(PREDICTION_REQUESTS_TOTAL.clone()),
        Box::new(PREDICTIONS_TOTAL.clone()),
        Box::new(INFERENCE_DURATION_SECONDS.clone()),
    ];

    for collector in collectors {
        match PROMETHEUS_REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }

    tracing::debug!("Prometheus metrics registered");
    Ok(())
}

/// Render the registry in the text exposition format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
