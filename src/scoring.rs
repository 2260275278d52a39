//! Scoring surface for a persisted model
//!
//! Requests are JSON objects keyed by feature name. Every schema field must be
//! present and numeric; fields outside the schema are rejected rather than
//! silently dropped. The loaded artifact sits behind `RwLock<Arc<_>>`: scoring
//! clones the `Arc` and releases the lock, and a reload only holds the write
//! lock for the pointer swap.

use crate::persist::ModelArtifact;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Outcome of a scoring request, as sent back to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreResponse {
    /// Successful score
    Ok {
        /// Class-1 probability in [0, 1]
        #[serde(rename = "adhd_probability")]
        probability: f64,
    },
    /// Rejected request
    Error {
        /// Why the request was rejected
        error: String,
    },
}

/// Holds the current artifact and answers scoring requests
#[derive(Debug)]
pub struct ScoringService {
    artifact: RwLock<Arc<ModelArtifact>>,
}

impl ScoringService {
    /// Serve an in-memory artifact
    #[must_use]
    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        Self {
            artifact: RwLock::new(Arc::new(artifact)),
        }
    }

    /// Load an artifact from disk and serve it
    ///
    /// # Errors
    /// Returns persistence errors from [`ModelArtifact::load_unchecked`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_artifact(ModelArtifact::load_unchecked(path)?))
    }

    /// Artifact currently being served
    #[must_use]
    pub fn current(&self) -> Arc<ModelArtifact> {
        Arc::clone(&self.artifact.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Ordered field names a request must carry
    #[must_use]
    pub fn schema(&self) -> Vec<String> {
        self.current().feature_names.clone()
    }

    /// Score one record
    ///
    /// # Errors
    ///
    /// - `MissingField` for an absent schema field
    /// - `UnknownField` for a field outside the schema
    /// - `InvalidField` for a non-numeric value, or a condition indicator
    ///   other than 0 or 1
    pub fn score(&self, record: &Map<String, Value>) -> Result<f64> {
        let artifact = self.current();
        let names = &artifact.feature_names;

        let mut row = Vec::with_capacity(names.len());
        for name in names {
            let value = record
                .get(name)
                .ok_or_else(|| Error::MissingField(name.clone()))?;
            let number = value.as_f64().ok_or_else(|| Error::InvalidField {
                field: name.clone(),
                reason: format!("expected a number, got {value}"),
            })?;
            if artifact.summary.condition_columns.contains(name) && !is_indicator(number) {
                return Err(Error::InvalidField {
                    field: name.clone(),
                    reason: format!("condition indicator must be 0 or 1, got {value}"),
                });
            }
            row.push(number);
        }
        if let Some(extra) = record.keys().find(|&k| !names.contains(k)) {
            return Err(Error::UnknownField(extra.clone()));
        }

        artifact.predict_row(&row)
    }

    /// Score a raw JSON request; never panics and never returns `Err`
    #[must_use]
    pub fn score_json(&self, body: &str) -> ScoreResponse {
        let scored = serde_json::from_str::<Value>(body)
            .map_err(Error::from)
            .and_then(|value| match value {
                Value::Object(record) => self.score(&record),
                other => Err(Error::InvalidInput(format!(
                    "request must be a JSON object, got {other}"
                ))),
            });
        match scored {
            Ok(probability) => ScoreResponse::Ok { probability },
            Err(e) => {
                warn!(error = %e, "Rejected scoring request");
                ScoreResponse::Error {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Replace the artifact with one carrying the same schema
    ///
    /// # Errors
    /// Returns `ArtifactSchemaMismatch` if the new schema differs; the old
    /// artifact keeps serving
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let schema = self.current().schema()?;
        let next = ModelArtifact::load(path, &schema)?;
        self.swap(next);
        Ok(())
    }

    /// Replace the artifact and adopt its schema
    ///
    /// # Errors
    /// Returns persistence errors; the old artifact keeps serving
    pub fn reload_any<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let next = ModelArtifact::load_unchecked(path)?;
        self.swap(next);
        Ok(())
    }

    fn swap(&self, next: ModelArtifact) {
        let features = next.feature_names.len();
        let next = Arc::new(next);
        *self.artifact.write().unwrap_or_else(PoisonError::into_inner) = next;
        info!(features, "Scoring artifact swapped");
    }
}

#[allow(clippy::float_cmp)]
fn is_indicator(value: f64) -> bool {
    value == 0.0 || value == 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FeatureSchema;
    use crate::estimator::EstimatorParams;
    use crate::persist::ArtifactSummary;
    use crate::pipeline::{Pipeline, PipelineSpec};
    use crate::search::ScorePopulation;
    use ndarray::array;
    use serde_json::json;

    fn service() -> ScoringService {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 1.0], [4.0, 1.0], [5.0, 0.0], [6.0, 1.0]];
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
            best_score: 1.0,
            population: ScorePopulation::Natural,
            nested_mean: None,
            nested_std: None,
            label_quantile: 0.8,
            label_threshold: 1.0,
            training_rows: 6,
            holdout_auc: None,
            condition_columns: vec!["experiment_staircase_SSD".to_string()],
        };
        let schema = FeatureSchema::new(["meanmt", "experiment_staircase_SSD"]).unwrap();
        ScoringService::from_artifact(ModelArtifact::new(&schema, pipeline, summary).unwrap())
    }

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_score_in_unit_interval() {
        let p = service()
            .score(&record(json!({ "meanmt": 3.5, "experiment_staircase_SSD": 1 })))
            .unwrap();
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_missing_field() {
        let err = service().score(&record(json!({ "meanmt": 3.5 }))).unwrap_err();
        assert!(matches!(err, Error::MissingField(f) if f == "experiment_staircase_SSD"));
    }

    #[test]
    fn test_unknown_field() {
        let err = service()
            .score(&record(json!({ "meanmt": 3.5, "experiment_staircase_SSD": 0, "age": 30 })))
            .unwrap_err();
        assert!(matches!(err, Error::UnknownField(f) if f == "age"));
    }

    #[test]
    fn test_non_numeric_field() {
        let err = service()
            .score(&record(json!({ "meanmt": "fast", "experiment_staircase_SSD": 0 })))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidField { .. }));
    }

    #[test]
    fn test_condition_indicator_must_be_binary() {
        let svc = service();
        for bad in [json!(7), json!(0.5), json!(-1)] {
            let err = svc
                .score(&record(json!({ "meanmt": 3.5, "experiment_staircase_SSD": bad })))
                .unwrap_err();
            assert!(matches!(
                err,
                Error::InvalidField { field, .. } if field == "experiment_staircase_SSD"
            ));
        }
        assert!(svc
            .score(&record(json!({ "meanmt": 3.5, "experiment_staircase_SSD": 1.0 })))
            .is_ok());
        // continuous features still take any number
        assert!(svc
            .score(&record(json!({ "meanmt": -42.5, "experiment_staircase_SSD": 0 })))
            .is_ok());
    }

    #[test]
    fn test_score_json_payloads() {
        let svc = service();
        let ok = svc.score_json(r#"{ "meanmt": 2.0, "experiment_staircase_SSD": 0 }"#);
        let body = serde_json::to_value(&ok).unwrap();
        assert!(body["adhd_probability"].is_f64());

        let bad = svc.score_json("[1, 2]");
        let body = serde_json::to_value(&bad).unwrap();
        assert!(body["error"].as_str().unwrap().contains("JSON object"));

        let garbage = svc.score_json("{not json");
        assert!(matches!(garbage, ScoreResponse::Error { .. }));
    }

    #[test]
    fn test_reload_keeps_serving_on_schema_mismatch() {
        let svc = service();
        let path = std::env::temp_dir().join(format!("drift-model-scoring-{}.json", std::process::id()));

        let mut other = (*svc.current()).clone();
        other.feature_names = vec!["a".to_string(), "b".to_string()];
        other.save(&path, "run-x").unwrap();

        assert!(matches!(
            svc.reload(&path).unwrap_err(),
            Error::ArtifactSchemaMismatch { .. }
        ));
        assert_eq!(svc.schema()[0], "meanmt");

        svc.reload_any(&path).unwrap();
        assert_eq!(svc.schema(), vec!["a", "b"]);
        std::fs::remove_file(&path).unwrap();
    }
}
