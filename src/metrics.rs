//! Snapshot fetch metrics
//!
//! Tracks latency percentiles and success rates for aggregation runs.

use crate::types::FetchMetrics;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Maximum number of samples to keep for metrics calculation
const MAX_SAMPLES: usize = 100;

impl FetchMetrics {
    /// Creates metrics with no data
    pub fn empty(source: &str) -> Self {
        Self {
            source: source.to_string(),
            latency_p50_ms: 0.0,
            latency_p99_ms: 0.0,
            success_rate: 1.0,
            total_requests: 0,
            failed_requests: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LatencySample {
    duration_ms: f64,
    success: bool,
}

#[derive(Debug, Default)]
struct Window {
    samples: VecDeque<LatencySample>,
    total_requests: u64,
    failed_requests: u64,
}

/// Collects and computes metrics for a snapshot source
pub struct MetricsCollector {
    source: String,
    window: RwLock<Window>,
}

impl MetricsCollector {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            window: RwLock::new(Window {
                samples: VecDeque::with_capacity(MAX_SAMPLES),
                ..Window::default()
            }),
        }
    }

    /// Records one run with its duration and outcome
    pub async fn record_request(&self, duration: Duration, success: bool) {
        let mut window = self.window.write().await;
        window.total_requests += 1;
        if !success {
            window.failed_requests += 1;
        }
        if window.samples.len() >= MAX_SAMPLES {
            window.samples.pop_front();
        }
        window.samples.push_back(LatencySample {
            duration_ms: duration.as_secs_f64() * 1000.0,
            success,
        });
    }

    /// Computes current metrics from collected samples
    pub async fn get_metrics(&self) -> FetchMetrics {
        let window = self.window.read().await;
        if window.samples.is_empty() {
            return FetchMetrics::empty(&self.source);
        }

        // Percentiles over successful runs only
        let mut latencies: Vec<f64> = window
            .samples
            .iter()
            .filter(|s| s.success)
            .map(|s| s.duration_ms)
            .collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let total = window.total_requests;
        let failed = window.failed_requests;

        FetchMetrics {
            source: self.source.clone(),
            latency_p50_ms: percentile(&latencies, 50.0),
            latency_p99_ms: percentile(&latencies, 99.0),
            success_rate: if total > 0 {
                (total - failed) as f64 / total as f64
            } else {
                1.0
            },
            total_requests: total,
            failed_requests: failed,
        }
    }
}

/// Calculate percentile from sorted values
fn percentile(sorted_values: &[f64], p: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }

    let idx = (p / 100.0 * (sorted_values.len() - 1) as f64).round() as usize;
    sorted_values[idx.min(sorted_values.len() - 1)]
}
