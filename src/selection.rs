//! Recursive feature elimination under cross-validation
//!
//! A linear ranking model is refit after every removal and the weakest column
//! (smallest |coefficient|) is dropped, one at a time, down to a floor. Each
//! inner fold runs its own elimination path and scores every subset size on
//! its held-out rows; the size with the best mean ROC AUC wins. A final
//! elimination on all rows given to [`FeatureSelector::fit`] produces the mask.
//!
//! Inside a pipeline, `fit` only ever sees training rows, so the mask chosen
//! for an outer fold never depends on that fold's held-out data.

use crate::cv::StratifiedKFold;
use crate::estimator::{Estimator, LogisticRegression};
use crate::metrics::roc_auc;
use crate::{Error, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Elimination settings (unfitted)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureSelector {
    /// Never keep fewer columns than this
    pub min_features: usize,
    /// Inner cross-validation folds used to score subset sizes
    pub cv_folds: usize,
    /// Regularization of the ranking model
    pub ranking_c: f64,
    /// Seed for the inner fold shuffle
    pub seed: u64,
}

impl Default for FeatureSelector {
    fn default() -> Self {
        Self {
            min_features: 5,
            cv_folds: 5,
            ranking_c: 1.0,
            seed: 42,
        }
    }
}

/// Fitted selection: a boolean mask over the incoming columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSelection {
    mask: Vec<bool>,
    /// Mean inner-CV AUC per subset size, index 0 = `min_features` columns
    cv_scores: Vec<f64>,
    min_features: usize,
}

impl FeatureSelector {
    /// Choose a feature subset on the given (training) rows
    ///
    /// # Errors
    ///
    /// Propagates `EmptyFold` from the inner split and fitting errors
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<u8>) -> Result<FeatureSelection> {
        let n = x.ncols();
        if self.min_features == 0 {
            return Err(Error::InvalidConfig("min_features must be at least 1".to_string()));
        }
        let floor = self.min_features.min(n);
        if floor == n {
            return Ok(FeatureSelection {
                mask: vec![true; n],
                cv_scores: Vec::new(),
                min_features: floor,
            });
        }

        let labels = y.to_vec();
        let folds = StratifiedKFold::new(self.cv_folds, true, self.seed)?.split(&labels)?;

        // totals[k - floor] accumulates the AUC of k-column subsets
        let mut totals = vec![0.0; n - floor + 1];
        for fold in &folds {
            let x_train = x.select(Axis(0), &fold.train);
            let y_train = y.select(Axis(0), &fold.train);
            let x_test = x.select(Axis(0), &fold.test);
            let y_test: Vec<u8> = fold.test.iter().map(|&i| labels[i]).collect();

            self.eliminate(&x_train, &y_train, floor, |active, model| {
                let proba = model.predict_proba(&x_test.select(Axis(1), active));
                let auc = roc_auc(&y_test, &proba.to_vec())?;
                totals[active.len() - floor] += auc;
                Ok(())
            })?;
        }

        #[allow(clippy::cast_precision_loss)]
        let cv_scores: Vec<f64> = totals.iter().map(|t| t / folds.len() as f64).collect();

        // Ties go to the smaller subset
        let mut best = 0;
        for (i, &score) in cv_scores.iter().enumerate() {
            if score > cv_scores[best] {
                best = i;
            }
        }
        let target = floor + best;

        let mut final_active = Vec::new();
        self.eliminate(x, y, target, |active, _| {
            if active.len() == target {
                final_active = active.to_vec();
            }
            Ok(())
        })?;

        let mut mask = vec![false; n];
        for &col in &final_active {
            mask[col] = true;
        }

        tracing::debug!(
            selected = target,
            of = n,
            best_auc = cv_scores[best],
            "Recursive feature elimination finished"
        );

        Ok(FeatureSelection {
            mask,
            cv_scores,
            min_features: floor,
        })
    }

    /// Backward elimination from all columns down to `floor`, calling
    /// `visit(active_columns, model)` once per subset size (largest first).
    fn eliminate<F>(&self, x: &Array2<f64>, y: &Array1<u8>, floor: usize, mut visit: F) -> Result<()>
    where
        F: FnMut(&[usize], &LogisticRegression) -> Result<()>,
    {
        let mut active: Vec<usize> = (0..x.ncols()).collect();
        loop {
            let model = LogisticRegression::fit(&x.select(Axis(1), &active), y, self.ranking_c, 100)?;
            visit(&active, &model)?;
            if active.len() <= floor {
                return Ok(());
            }
            let importances = model.feature_importances();
            let mut weakest = 0;
            for (i, &imp) in importances.iter().enumerate() {
                if imp < importances[weakest] {
                    weakest = i;
                }
            }
            active.remove(weakest);
        }
    }
}

impl FeatureSelection {
    /// Mask over the incoming columns
    #[must_use]
    pub fn mask(&self) -> &[bool] {
        &self.mask
    }

    /// Indices of kept columns
    #[must_use]
    pub fn selected(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, &keep)| keep)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of kept columns
    #[must_use]
    pub fn n_selected(&self) -> usize {
        self.mask.iter().filter(|&&k| k).count()
    }

    /// Mean inner-CV AUC per subset size, starting at `min_features`
    #[must_use]
    pub fn cv_scores(&self) -> &[f64] {
        &self.cv_scores
    }

    /// Smallest subset size that was considered
    #[must_use]
    pub const fn min_features(&self) -> usize {
        self.min_features
    }

    /// Keep only the selected columns
    ///
    /// # Errors
    /// Returns error if the column count differs from the mask length
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.mask.len() {
            return Err(Error::ShapeMismatch {
                stage: "feature selection".to_string(),
                expected: self.mask.len(),
                found: x.ncols(),
            });
        }
        Ok(x.select(Axis(1), &self.selected()))
    }
}
