//! Metric Record - one scored search step

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single metric data point of a run.
///
/// `step` is the candidate index for search scores and the fold index for
/// nested scores; `label` carries the candidate description.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    step: u64,
    value: f64,
    label: Option<String>,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// Create a new metric record with the current timestamp.
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            step,
            value,
            label: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a builder for constructing a metric record with optional fields.
    #[must_use]
    pub fn builder(
        run_id: impl Into<String>,
        key: impl Into<String>,
        step: u64,
        value: f64,
    ) -> MetricRecordBuilder {
        MetricRecordBuilder::new(run_id, key, step, value)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the metric key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the step.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Get the metric value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Candidate description, if any.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Get the timestamp when the metric was recorded.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Builder for `MetricRecord`.
#[derive(Debug)]
pub struct MetricRecordBuilder {
    record: MetricRecord,
}

impl MetricRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            record: MetricRecord::new(run_id, key, step, value),
        }
    }

    /// Attach a candidate description.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.record.label = Some(label.into());
        self
    }

    /// Set a custom timestamp.
    #[must_use]
    pub const fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.record.timestamp = timestamp;
        self
    }

    /// Build the `MetricRecord`.
    #[must_use]
    pub fn build(self) -> MetricRecord {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_record_new() {
        let metric = MetricRecord::new("run-1", "cv_auc", 0, 0.5);
        assert_eq!(metric.run_id(), "run-1");
        assert_eq!(metric.key(), "cv_auc");
        assert_eq!(metric.step(), 0);
        assert!((metric.value() - 0.5).abs() < f64::EPSILON);
        assert!(metric.label().is_none());
    }

    #[test]
    fn test_metric_builder_label() {
        let metric = MetricRecord::builder("run-1", "cv_auc", 3, 0.8)
            .label("logistic(C=0.5)")
            .build();
        assert_eq!(metric.label(), Some("logistic(C=0.5)"));
    }
}
