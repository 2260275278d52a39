//! Run Record - one training run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Created, not started.
    Pending,
    /// Currently training.
    Running,
    /// Finished with a fitted model.
    Success,
    /// Stopped on an error.
    Failed,
}

/// A single training run and its lifecycle timestamps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    run_id: String,
    model_name: String,
    status: RunStatus,
    config: Option<serde_json::Value>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    failure: Option<String>,
}

impl RunRecord {
    /// Create a new run record in Pending status.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Unique identifier for the run
    /// * `model_name` - Name of the model being trained
    #[must_use]
    pub fn new(run_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            model_name: model_name.into(),
            status: RunStatus::Pending,
            config: None,
            started_at: None,
            ended_at: None,
            failure: None,
        }
    }

    /// Create a builder for constructing a run record with optional fields.
    #[must_use]
    pub fn builder(run_id: impl Into<String>, model_name: impl Into<String>) -> RunRecordBuilder {
        RunRecordBuilder::new(run_id, model_name)
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the model name.
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Training configuration snapshot, if recorded.
    #[must_use]
    pub const fn config(&self) -> Option<&serde_json::Value> {
        self.config.as_ref()
    }

    /// Get the start timestamp, if the run has started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Failure message of a failed run.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Start the run, transitioning from Pending to Running.
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Complete the run with the given final status.
    pub fn complete(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    /// Mark the run failed and keep the error message.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.failure = Some(message.into());
        self.complete(RunStatus::Failed);
    }
}

/// Builder for `RunRecord`.
#[derive(Debug)]
pub struct RunRecordBuilder {
    run_id: String,
    model_name: String,
    config: Option<serde_json::Value>,
}

impl RunRecordBuilder {
    /// Create a new builder with required fields.
    #[must_use]
    pub fn new(run_id: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            model_name: model_name.into(),
            config: None,
        }
    }

    /// Attach a configuration snapshot.
    #[must_use]
    pub fn config(mut self, config: serde_json::Value) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the `RunRecord`.
    #[must_use]
    pub fn build(self) -> RunRecord {
        RunRecord {
            run_id: self.run_id,
            model_name: self.model_name,
            status: RunStatus::Pending,
            config: self.config,
            started_at: None,
            ended_at: None,
            failure: None,
        }
    }
}
