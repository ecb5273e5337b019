//! Prometheus metrics collection for policy retrieval

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::index::Retrieval;

/// Retrieval point metrics
#[derive(Debug, Clone, Default)]
pub struct RetrievalMetrics {
    /// Total number of retrievals
    pub retrievals: u64,

    /// Retrievals that returned an invalid result
    pub invalid_results: u64,

    /// Sum of matched documents over all retrievals
    pub documents_matched: u64,

    /// Literal (or target) evaluations performed
    pub literal_evaluations: u64,

    /// Literal evaluations that produced an error
    pub literal_errors: u64,

    /// Documents published (valid or not)
    pub publishes: u64,

    /// Documents unpublished
    pub unpublishes: u64,

    /// Latency percentiles
    pub latency_p50_ms: f64,
    pub latency_p90_ms: f64,
    pub latency_p99_ms: f64,

    /// Average latency
    pub avg_latency_ms: f64,
}

impl RetrievalMetrics {
    /// Share of retrievals that were invalid
    pub fn invalid_rate(&self) -> f64 {
        if self.retrievals == 0 {
            0.0
        } else {
            self.invalid_results as f64 / self.retrievals as f64
        }
    }

    /// Average number of literal evaluations per retrieval
    pub fn evaluations_per_retrieval(&self) -> f64 {
        if self.retrievals == 0 {
            0.0
        } else {
            self.literal_evaluations as f64 / self.retrievals as f64
        }
    }
}

/// Metrics collector with Prometheus-compatible export
pub struct MetricsCollector {
    metrics: Arc<RwLock<RetrievalMetrics>>,

    /// Latency samples for percentile calculation
    latency_samples: Arc<RwLock<Vec<f64>>>,

    max_samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(RetrievalMetrics::default())),
            latency_samples: Arc::new(RwLock::new(Vec::with_capacity(10_000))),
            max_samples: 10_000,
        }
    }

    /// Record one retrieval and how long it took
    pub async fn record_retrieval(&self, retrieval: &Retrieval, latency: Duration) {
        {
            let mut metrics = self.metrics.write().await;
            metrics.retrievals += 1;
            if !retrieval.result.is_valid {
                metrics.invalid_results += 1;
            }
            metrics.documents_matched += retrieval.result.matches.len() as u64;
            metrics.literal_evaluations += retrieval.literal_evaluations as u64;
            metrics.literal_errors += retrieval.literal_errors as u64;
        }
        self.record_latency(latency).await;
    }

    pub async fn record_publish(&self) {
        self.metrics.write().await.publishes += 1;
    }

    pub async fn record_unpublish(&self) {
        self.metrics.write().await.unpublishes += 1;
    }

    /// Record retrieval latency
    pub async fn record_latency(&self, latency: Duration) {
        let latency_ms = latency.as_secs_f64() * 1000.0;

        let mut samples = self.latency_samples.write().await;
        samples.push(latency_ms);

        // Keep only recent samples
        if samples.len() > self.max_samples {
            samples.drain(0..1_000);
        }

        let mut metrics = self.metrics.write().await;
        let sum: f64 = samples.iter().sum();
        metrics.avg_latency_ms = sum / samples.len() as f64;

        let mut sorted = samples.clone();
        sorted.sort_by(f64::total_cmp);

        metrics.latency_p50_ms = Self::percentile(&sorted, 0.50);
        metrics.latency_p90_ms = Self::percentile(&sorted, 0.90);
        metrics.latency_p99_ms = Self::percentile(&sorted, 0.99);
    }

    /// Get current metrics snapshot
    pub async fn get_metrics(&self) -> RetrievalMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = RetrievalMetrics::default();
        self.latency_samples.write().await.clear();
    }

    /// Export metrics in Prometheus text format
    pub async fn export_prometheus(&self) -> String {
        let metrics = self.metrics.read().await;

        format!(
            r#"# HELP authz_prp_retrievals_total Total number of policy retrievals
# TYPE authz_prp_retrievals_total counter
authz_prp_retrievals_total {}

# HELP authz_prp_invalid_results_total Retrievals with an invalid result
# TYPE authz_prp_invalid_results_total counter
authz_prp_invalid_results_total {}

# HELP authz_prp_documents_matched_total Matched documents over all retrievals
# TYPE authz_prp_documents_matched_total counter
authz_prp_documents_matched_total {}

# HELP authz_prp_literal_evaluations_total Literal evaluations
# TYPE authz_prp_literal_evaluations_total counter
authz_prp_literal_evaluations_total {}

# HELP authz_prp_literal_errors_total Literal evaluations that failed
# TYPE authz_prp_literal_errors_total counter
authz_prp_literal_errors_total {}

# HELP authz_prp_publishes_total Published documents
# TYPE authz_prp_publishes_total counter
authz_prp_publishes_total {}

# HELP authz_prp_unpublishes_total Unpublished documents
# TYPE authz_prp_unpublishes_total counter
authz_prp_unpublishes_total {}

# HELP authz_prp_latency_seconds Retrieval latency percentiles
# TYPE authz_prp_latency_seconds summary
authz_prp_latency_seconds{{quantile="0.5"}} {}
authz_prp_latency_seconds{{quantile="0.9"}} {}
authz_prp_latency_seconds{{quantile="0.99"}} {}
"#,
            metrics.retrievals,
            metrics.invalid_results,
            metrics.documents_matched,
            metrics.literal_evaluations,
            metrics.literal_errors,
            metrics.publishes,
            metrics.unpublishes,
            metrics.latency_p50_ms / 1000.0,
            metrics.latency_p90_ms / 1000.0,
            metrics.latency_p99_ms / 1000.0,
        )
    }

    /// Calculate percentile from sorted data
    fn percentile(sorted: &[f64], p: f64) -> f64 {
        if sorted.is_empty() {
            return 0.0;
        }

        let idx = ((sorted.len() as f64) * p) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
