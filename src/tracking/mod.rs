//! Training ledger
//!
//! Records what a training run did so its search trace can be inspected after
//! the fact.
//!
//! ```text
//! RunRecord (1) ──< MetricRecord (N)   [one per candidate / outer fold]
//!               └─< ArtifactRecord (N) [one per saved model]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use drift_model::tracking::{MetricRecord, RunRecord, RunStatus, TrainingStore};
//!
//! let mut store = TrainingStore::new();
//! let mut run = RunRecord::new("run-001", "risk-logreg");
//! run.start();
//!
//! store.add_metric(MetricRecord::new(run.run_id(), "cv_auc", 0, 0.71));
//! store.add_metric(MetricRecord::new(run.run_id(), "cv_auc", 1, 0.78));
//!
//! run.complete(RunStatus::Success);
//! store.add_run(run);
//!
//! let best = store.best_metric("run-001", "cv_auc").unwrap();
//! assert_eq!(best.step(), 1);
//! ```

mod artifact_record;
mod metric_record;
mod run_record;
mod store;

pub use artifact_record::ArtifactRecord;
pub use metric_record::{MetricRecord, MetricRecordBuilder};
pub use run_record::{RunRecord, RunRecordBuilder, RunStatus};
pub use store::TrainingStore;

/// Metric key for per-candidate mean cross-validated AUC
pub const CV_AUC: &str = "cv_auc";
/// Metric key for per-outer-fold nested AUC
pub const NESTED_AUC: &str = "nested_auc";
/// Metric key for the held-out AUC of the refit pipeline
pub const HOLDOUT_AUC: &str = "holdout_auc";
