//! Per-stage timing collection
//!
//! Lightweight measurements of each pipeline stage with a statistical summary
//! that is attached to every batch report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Oldest half is dropped once this many measurements are held.
pub const MAX_MEASUREMENTS: usize = 10000;

/// Pipeline stages that are timed individually.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Decode,
    Extract,
    Classify,
    Estimate,
    Warp,
    Annotate,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Decode,
        Stage::Extract,
        Stage::Classify,
        Stage::Estimate,
        Stage::Warp,
        Stage::Annotate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Decode => "decode",
            Stage::Extract => "extract",
            Stage::Classify => "classify",
            Stage::Estimate => "estimate",
            Stage::Warp => "warp",
            Stage::Annotate => "annotate",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual performance measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMeasurement {
    pub stage: Stage,
    pub duration_ms: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: Option<Uuid>,
}

/// Statistical summary of performance measurements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub stage: Stage,
    pub count: usize,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub std_dev_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
}

/// Thread-safe metrics collector
#[derive(Debug)]
pub struct MetricsCollector {
    measurements: Mutex<Vec<PerformanceMeasurement>>,
    enabled: bool,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MetricsCollector {
    pub fn new(enabled: bool) -> Self {
        Self {
            measurements: Mutex::new(Vec::new()),
            enabled,
        }
    }

    /// Record a performance measurement
    pub fn record(&self, stage: Stage, duration: Duration, correlation_id: Option<Uuid>) {
        if !self.enabled {
            return;
        }

        let measurement = PerformanceMeasurement {
            stage,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: chrono::Utc::now(),
            correlation_id,
        };

        if let Ok(mut measurements) = self.measurements.lock() {
            measurements.push(measurement);

            // Prevent unbounded growth across long sessions
            if measurements.len() > MAX_MEASUREMENTS {
                measurements.drain(0..MAX_MEASUREMENTS / 2);
            }
        }
    }

    /// Run `f`, recording its wall time under `stage`.
    pub fn time<T>(&self, stage: Stage, correlation_id: Option<Uuid>, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(stage, start.elapsed(), correlation_id);
        result
    }

    fn durations(&self, stage: Stage, correlation_id: Option<Uuid>) -> Vec<f64> {
        match self.measurements.lock() {
            Ok(measurements) => measurements
                .iter()
                .filter(|m| m.stage == stage)
                .filter(|m| correlation_id.is_none() || m.correlation_id == correlation_id)
                .map(|m| m.duration_ms)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Statistics for one stage, optionally restricted to one batch.
    pub fn calculate_stats(&self, stage: Stage, correlation_id: Option<Uuid>) -> Option<PerformanceStats> {
        let mut durations = self.durations(stage, correlation_id);
        if durations.is_empty() {
            return None;
        }

        durations.sort_by(|a, b| a.total_cmp(b));

        let count = durations.len();
        let mean = durations.iter().sum::<f64>() / count as f64;
        let variance = durations
            .iter()
            .map(|d| {
                let diff = d - mean;
                diff * diff
            })
            .sum::<f64>()
            / count as f64;

        let median = if count % 2 == 0 {
            (durations[count / 2 - 1] + durations[count / 2]) / 2.0
        } else {
            durations[count / 2]
        };
        let p95_index = ((count as f64) * 0.95) as usize;

        Some(PerformanceStats {
            stage,
            count,
            mean_ms: mean,
            median_ms: median,
            std_dev_ms: variance.sqrt(),
            min_ms: durations[0],
            max_ms: durations[count - 1],
            p95_ms: durations[p95_index.min(count - 1)],
        })
    }

    /// Stats for every stage that has measurements.
    pub fn snapshot(&self, correlation_id: Option<Uuid>) -> Vec<PerformanceStats> {
        Stage::ALL
            .iter()
            .filter_map(|stage| self.calculate_stats(*stage, correlation_id))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut measurements) = self.measurements.lock() {
            measurements.clear();
        }
    }

    pub fn measurement_count(&self) -> usize {
        self.measurements.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector() {
        let collector = MetricsCollector::new(true);
        let correlation_id = Uuid::new_v4();

        collector.record(Stage::Warp, Duration::from_millis(100), Some(correlation_id));
        collector.record(Stage::Warp, Duration::from_millis(150), Some(correlation_id));
        collector.record(Stage::Warp, Duration::from_millis(200), None);
        collector.record(Stage::Decode, Duration::from_millis(5), None);

        let stats = collector.calculate_stats(Stage::Warp, None).unwrap();
        assert_eq!(stats.count, 3);
        assert!((stats.mean_ms - 150.0).abs() < 1.0);
        assert!((stats.median_ms - 150.0).abs() < 1.0);
        assert!((stats.max_ms - 200.0).abs() < 1.0);

        let batch_only = collector.calculate_stats(Stage::Warp, Some(correlation_id)).unwrap();
        assert_eq!(batch_only.count, 2);

        let snapshot = collector.snapshot(None);
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].stage, Stage::Decode);
    }

    #[test]
    fn test_time_records_measurement() {
        let collector = MetricsCollector::default();
        let value = collector.time(Stage::Estimate, None, || 41 + 1);
        assert_eq!(value, 42);
        assert_eq!(collector.measurement_count(), 1);
    }

    #[test]
    fn test_disabled_collector() {
        let collector = MetricsCollector::new(false);
        collector.record(Stage::Extract, Duration::from_millis(100), None);
        assert_eq!(collector.measurement_count(), 0);
        assert!(collector.snapshot(None).is_empty());
    }
}
