//! Training Store - in-memory ledger of runs, metrics and artifacts

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{ArtifactRecord, MetricRecord, RunRecord};

/// In-memory store for training-run records.
///
/// Runs are keyed by ID; metrics and artifacts are kept in insertion order and
/// filtered on query.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TrainingStore {
    runs: HashMap<String, RunRecord>,
    metrics: Vec<MetricRecord>,
    artifacts: Vec<ArtifactRecord>,
}

impl TrainingStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty() && self.metrics.is_empty() && self.artifacts.is_empty()
    }

    /// Number of runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Number of metrics.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Add or replace a run.
    pub fn add_run(&mut self, run: RunRecord) {
        self.runs.insert(run.run_id().to_string(), run);
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.get(run_id)
    }

    /// Every run, in no particular order.
    pub fn runs(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.values()
    }

    /// Add a metric.
    pub fn add_metric(&mut self, metric: MetricRecord) {
        self.metrics.push(metric);
    }

    /// Metrics for a run and key, ordered by step.
    #[must_use]
    pub fn metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .iter()
            .filter(|m| m.run_id() == run_id && m.key() == key)
            .cloned()
            .collect();
        metrics.sort_by_key(MetricRecord::step);
        metrics
    }

    /// Highest-valued metric for a run and key; the lowest step wins ties.
    #[must_use]
    pub fn best_metric(&self, run_id: &str, key: &str) -> Option<MetricRecord> {
        self.metrics_for_run(run_id, key)
            .into_iter()
            .reduce(|best, m| if m.value() > best.value() { m } else { best })
    }

    /// Add an artifact.
    pub fn add_artifact(&mut self, artifact: ArtifactRecord) {
        self.artifacts.push(artifact);
    }

    /// Artifacts written by a run, in write order.
    #[must_use]
    pub fn artifacts_for_run(&self, run_id: &str) -> Vec<&ArtifactRecord> {
        self.artifacts.iter().filter(|a| a.run_id() == run_id).collect()
    }
}
