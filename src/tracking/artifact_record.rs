//! Artifact Record - a model file written by a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted model artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    path: String,
    size_bytes: u64,
    feature_count: usize,
    format_version: u32,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create a new artifact record with the current timestamp.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the run that produced the artifact
    /// * `path` - Final location of the artifact file
    /// * `size_bytes` - Size of the written file
    /// * `feature_count` - Length of the frozen feature schema
    /// * `format_version` - Artifact format version
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        path: impl Into<String>,
        size_bytes: u64,
        feature_count: usize,
        format_version: u32,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            path: path.into(),
            size_bytes,
            feature_count,
            format_version,
            created_at: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the artifact path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the artifact size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Number of schema features.
    #[must_use]
    pub const fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// Artifact format version.
    #[must_use]
    pub const fn format_version(&self) -> u32 {
        self.format_version
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
