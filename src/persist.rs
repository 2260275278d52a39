//! Model artifact persistence
//!
//! An artifact is one JSON document holding the format version, the frozen
//! feature names, the fitted pipeline and a search summary. Floats are written
//! with round-trip precision, so a loaded pipeline predicts bit-identically.
//!
//! Saving writes a sibling temp file, syncs it and renames it over the target:
//! readers see either the old artifact or the new one, never a partial file.

use crate::dataset::FeatureSchema;
use crate::estimator::EstimatorParams;
use crate::pipeline::Pipeline;
use crate::search::ScorePopulation;
use crate::tracking::ArtifactRecord;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Artifact format version written by this crate
pub const FORMAT_VERSION: u32 = 1;

/// How the persisted model was chosen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    /// Model name from the training config
    pub model_name: String,
    /// Winning hyperparameters
    pub best_params: EstimatorParams,
    /// Mean CV AUC of the winner
    pub best_score: f64,
    /// Population the CV scores describe
    pub population: ScorePopulation,
    /// Nested CV mean AUC, when nested evaluation ran
    pub nested_mean: Option<f64>,
    /// Nested CV AUC standard deviation
    pub nested_std: Option<f64>,
    /// Quantile used for labeling
    pub label_quantile: f64,
    /// Severity threshold at that quantile
    pub label_threshold: f64,
    /// Rows the final pipeline was fit on
    pub training_rows: usize,
    /// AUC on the held-out rows, when a held-out split was configured
    #[serde(default)]
    pub holdout_auc: Option<f64>,
    /// Condition indicator columns; requests must send 0 or 1 for these
    #[serde(default)]
    pub condition_columns: Vec<String>,
}

/// Persisted model: frozen schema + fitted pipeline + summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Format version
    pub format_version: u32,
    /// Ordered input feature names (the scoring contract)
    pub feature_names: Vec<String>,
    /// Fitted pipeline
    pub pipeline: Pipeline,
    /// Search summary
    pub summary: ArtifactSummary,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl ModelArtifact {
    /// Bundle a fitted pipeline with its schema
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the pipeline expects a different column count
    pub fn new(schema: &FeatureSchema, pipeline: Pipeline, summary: ArtifactSummary) -> Result<Self> {
        if pipeline.n_features_in() != schema.len() {
            return Err(Error::ShapeMismatch {
                stage: "artifact".to_string(),
                expected: schema.len(),
                found: pipeline.n_features_in(),
            });
        }
        Ok(Self {
            format_version: FORMAT_VERSION,
            feature_names: schema.names().to_vec(),
            pipeline,
            summary,
            created_at: Utc::now(),
        })
    }

    /// Frozen feature schema
    ///
    /// # Errors
    /// Returns `InvalidInput` if the stored names contain duplicates
    pub fn schema(&self) -> Result<FeatureSchema> {
        FeatureSchema::new(self.feature_names.iter().cloned())
    }

    /// Probability for one row given in schema order
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the row length differs from the schema
    pub fn predict_row(&self, row: &[f64]) -> Result<f64> {
        self.pipeline.predict_row(row)
    }

    /// Atomically write the artifact to `path`
    ///
    /// # Errors
    /// Returns `Io` or `Json` errors; the target is untouched on failure
    pub fn save<P: AsRef<Path>>(&self, path: P, run_id: &str) -> Result<ArtifactRecord> {
        let path = path.as_ref();
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp = temp_path(path);

        let written = (|| -> Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, path)?;
            Ok(())
        })();
        if let Err(e) = written {
            // Leave no temp file behind
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        info!(
            path = %path.display(),
            bytes = bytes.len(),
            features = self.feature_names.len(),
            "Saved model artifact"
        );

        Ok(ArtifactRecord::new(
            run_id,
            path.display().to_string(),
            bytes.len() as u64,
            self.feature_names.len(),
            self.format_version,
        ))
    }

    /// Load an artifact and require its schema to equal `expected`
    ///
    /// # Errors
    /// Returns `ArtifactVersion` or `ArtifactSchemaMismatch` on incompatibility
    pub fn load<P: AsRef<Path>>(path: P, expected: &FeatureSchema) -> Result<Self> {
        let artifact = Self::load_unchecked(path)?;
        if artifact.feature_names.as_slice() != expected.names() {
            return Err(Error::ArtifactSchemaMismatch {
                expected: expected.names().to_vec(),
                found: artifact.feature_names,
            });
        }
        Ok(artifact)
    }

    /// Load an artifact and adopt whatever schema it carries
    ///
    /// # Errors
    /// Returns `Io`, `Json` or `ArtifactVersion` errors
    pub fn load_unchecked<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;

        // Check the version before committing to the full layout
        #[derive(Deserialize)]
        struct Header {
            format_version: u32,
        }
        let header: Header = serde_json::from_slice(&bytes)?;
        if header.format_version != FORMAT_VERSION {
            return Err(Error::ArtifactVersion {
                expected: FORMAT_VERSION,
                found: header.format_version,
            });
        }

        let artifact: Self = serde_json::from_slice(&bytes)?;
        if artifact.pipeline.n_features_in() != artifact.feature_names.len() {
            return Err(Error::ShapeMismatch {
                stage: "artifact load".to_string(),
                expected: artifact.feature_names.len(),
                found: artifact.pipeline.n_features_in(),
            });
        }

        info!(
            path = %path.display(),
            features = artifact.feature_names.len(),
            model = %artifact.summary.best_params,
            "Loaded model artifact"
        );
        Ok(artifact)
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map_or_else(|| "artifact".to_string(), |n| n.to_string_lossy().into_owned());
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineSpec;
    use ndarray::array;

    fn artifact() -> ModelArtifact {
        let x = array![[1.0, 0.5], [2.0, 0.1], [3.0, 0.9], [4.0, 0.3], [5.0, 0.7], [6.0, 0.2]];
        let y = array![0, 0, 0, 1, 1, 1];
        let spec = PipelineSpec {
            selection: None,
            ..PipelineSpec::default()
        };
        let params = EstimatorParams::logistic(1.0);
        let pipeline = Pipeline::fit(&spec, &params, &x, &y).unwrap();
        let summary = ArtifactSummary {
            model_name: "test".to_string(),
            best_params: params,
            best_score: 0.9,
            population: ScorePopulation::Natural,
            nested_mean: None,
            nested_std: None,
            label_quantile: 0.8,
            label_threshold: 3.5,
            training_rows: 6,
            holdout_auc: None,
            condition_columns: Vec::new(),
        };
        ModelArtifact::new(&FeatureSchema::new(["a", "b"]).unwrap(), pipeline, summary).unwrap()
    }

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("drift-model-persist-{}-{name}", std::process::id()))
    }

    #[test]
    fn test_save_load_bit_identical() {
        let original = artifact();
        let path = scratch("roundtrip.json");
        let record = original.save(&path, "run-1").unwrap();
        assert_eq!(record.feature_count(), 2);
        assert!(record.size_bytes() > 0);

        let loaded = ModelArtifact::load(&path, &FeatureSchema::new(["a", "b"]).unwrap()).unwrap();
        assert_eq!(loaded, original);
        let row = [2.5, 0.4];
        assert_eq!(
            loaded.predict_row(&row).unwrap().to_bits(),
            original.predict_row(&row).unwrap().to_bits()
        );
        assert!(!temp_path(&path).exists());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_rejects_other_schema() {
        let path = scratch("schema.json");
        artifact().save(&path, "run-1").unwrap();
        let err = ModelArtifact::load(&path, &FeatureSchema::new(["b", "a"]).unwrap()).unwrap_err();
        assert!(matches!(err, Error::ArtifactSchemaMismatch { .. }));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_rejects_other_version() {
        let path = scratch("version.json");
        let mut old = artifact();
        old.format_version = FORMAT_VERSION + 1;
        old.save(&path, "run-1").unwrap();
        let err = ModelArtifact::load_unchecked(&path).unwrap_err();
        assert!(matches!(err, Error::ArtifactVersion { .. }));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_new_rejects_wrong_width() {
        let a = artifact();
        let err = ModelArtifact::new(&FeatureSchema::new(["a"]).unwrap(), a.pipeline, a.summary).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
