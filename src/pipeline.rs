//! Fit/predict chain: imputer → scaler → feature selector → estimator
//!
//! Every stage is fit on the rows passed to [`Pipeline::fit`] and nothing
//! else. Cross-validation fits one pipeline per training fold, so held-out
//! rows never influence medians, scaling, the selected mask or the model.

use crate::estimator::{Estimator, EstimatorParams, FittedEstimator};
use crate::metrics::roc_auc;
use crate::preprocess::{ImputeStrategy, Imputer, StandardScaler};
use crate::selection::{FeatureSelection, FeatureSelector};
use crate::{Error, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Unfitted pipeline shape shared by every search candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Fill strategy for missing cells
    pub impute: ImputeStrategy,
    /// Recursive feature elimination, or `None` to keep every column
    pub selection: Option<FeatureSelector>,
}

impl Default for PipelineSpec {
    fn default() -> Self {
        Self {
            impute: ImputeStrategy::Median,
            selection: Some(FeatureSelector::default()),
        }
    }
}

/// Fitted pipeline, immutable after fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    imputer: Imputer,
    scaler: StandardScaler,
    selection: Option<FeatureSelection>,
    params: EstimatorParams,
    estimator: FittedEstimator,
}

impl Pipeline {
    /// Fit every stage in order on `x`/`y`
    ///
    /// # Errors
    /// Propagates the first failing stage's error
    pub fn fit(
        spec: &PipelineSpec,
        params: &EstimatorParams,
        x: &Array2<f64>,
        y: &Array1<u8>,
    ) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(Error::ShapeMismatch {
                stage: "pipeline fit".to_string(),
                expected: x.nrows(),
                found: y.len(),
            });
        }

        let imputer = Imputer::fit(x, spec.impute)?;
        let imputed = imputer.transform(x)?;
        let scaler = StandardScaler::fit(&imputed)?;
        let scaled = scaler.transform(&imputed)?;

        let (selection, reduced) = match &spec.selection {
            Some(selector) => {
                let selection = selector.fit(&scaled, y)?;
                let reduced = selection.transform(&scaled)?;
                (Some(selection), reduced)
            }
            None => (None, scaled),
        };

        let estimator = params.fit(&reduced, y)?;

        Ok(Self {
            imputer,
            scaler,
            selection,
            params: params.clone(),
            estimator,
        })
    }

    /// Apply the fitted preprocessing and selection
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `x` has the wrong column count
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let scaled = self.scaler.transform(&self.imputer.transform(x)?)?;
        match &self.selection {
            Some(selection) => selection.transform(&scaled),
            None => Ok(scaled),
        }
    }

    /// Class-1 probability per row
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `x` has the wrong column count
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(self.estimator.predict_proba(&self.transform(x)?))
    }

    /// Probability for a single row given in schema order
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the row has the wrong length
    pub fn predict_row(&self, row: &[f64]) -> Result<f64> {
        let x = Array2::from_shape_vec((1, row.len()), row.to_vec())
            .map_err(|e| Error::Other(format!("pipeline input: {e}")))?;
        self.predict_proba(&x)?
            .first()
            .copied()
            .ok_or_else(|| Error::Other("pipeline produced no prediction".to_string()))
    }

    /// ROC AUC on labelled rows
    ///
    /// # Errors
    /// Returns error if `y` holds a single class or shapes disagree
    pub fn score(&self, x: &Array2<f64>, y: &Array1<u8>) -> Result<f64> {
        let proba = self.predict_proba(x)?;
        roc_auc(&y.to_vec(), &proba.to_vec())
    }

    /// Number of input columns the pipeline expects
    #[must_use]
    pub fn n_features_in(&self) -> usize {
        self.imputer.statistics().len()
    }

    /// Kept-column mask over the input columns (all true without selection)
    #[must_use]
    pub fn selected_mask(&self) -> Vec<bool> {
        self.selection
            .as_ref()
            .map_or_else(|| vec![true; self.n_features_in()], |s| s.mask().to_vec())
    }

    /// Hyperparameters of the fitted estimator
    #[must_use]
    pub const fn params(&self) -> &EstimatorParams {
        &self.params
    }

    /// Fitted estimator
    #[must_use]
    pub const fn estimator(&self) -> &FittedEstimator {
        &self.estimator
    }

    /// Fitted imputer
    #[must_use]
    pub const fn imputer(&self) -> &Imputer {
        &self.imputer
    }

    /// Fitted scaler
    #[must_use]
    pub const fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Fitted feature selection, if elimination was enabled
    #[must_use]
    pub const fn selection(&self) -> Option<&FeatureSelection> {
        self.selection.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy() -> (Array2<f64>, Array1<u8>) {
        let x = array![
            [1.0, 10.0, 0.3],
            [2.0, f64::NAN, 0.1],
            [3.0, 12.0, 0.2],
            [4.0, 11.0, 0.5],
            [5.0, 15.0, 0.4],
            [6.0, 14.0, f64::NAN],
            [7.0, 16.0, 0.6],
            [8.0, 18.0, 0.2],
        ];
        (x, array![0, 0, 0, 0, 1, 1, 1, 1])
    }

    fn no_selection() -> PipelineSpec {
        PipelineSpec {
            selection: None,
            ..PipelineSpec::default()
        }
    }

    #[test]
    fn test_fit_predict_handles_missing_cells() {
        let (x, y) = toy();
        let pipeline = Pipeline::fit(&no_selection(), &EstimatorParams::logistic(1.0), &x, &y).unwrap();
        let proba = pipeline.predict_proba(&x).unwrap();
        assert_eq!(proba.len(), 8);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(pipeline.score(&x, &y).unwrap() > 0.9);
    }

    #[test]
    fn test_imputer_statistics_come_from_fit_rows_only() {
        let (x, y) = toy();
        let pipeline = Pipeline::fit(&no_selection(), &EstimatorParams::logistic(1.0), &x, &y).unwrap();
        // column 1 observed: 10, 12, 11, 15, 14, 16, 18 -> median 14
        assert!((pipeline.imputer().statistics()[1] - 14.0).abs() < 1e-12);
    }

    #[test]
    fn test_predict_row_matches_batch() {
        let (x, y) = toy();
        let pipeline = Pipeline::fit(&no_selection(), &EstimatorParams::logistic(0.5), &x, &y).unwrap();
        let batch = pipeline.predict_proba(&x).unwrap();
        let single = pipeline.predict_row(&[3.0, 12.0, 0.2]).unwrap();
        assert!((single - batch[2]).abs() < 1e-12);
        assert!(pipeline.predict_row(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_mask_defaults_to_all_columns() {
        let (x, y) = toy();
        let pipeline = Pipeline::fit(&no_selection(), &EstimatorParams::logistic(1.0), &x, &y).unwrap();
        assert_eq!(pipeline.selected_mask(), vec![true; 3]);
        assert_eq!(pipeline.n_features_in(), 3);
    }

    #[test]
    fn test_serde_round_trip_predicts_identically() {
        let (x, y) = toy();
        let pipeline = Pipeline::fit(&no_selection(), &EstimatorParams::logistic(1.0), &x, &y).unwrap();
        let json = serde_json::to_string(&pipeline).unwrap();
        let restored: Pipeline = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, pipeline);
        assert_eq!(restored.predict_proba(&x).unwrap(), pipeline.predict_proba(&x).unwrap());
    }
}
