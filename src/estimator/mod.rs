//! Estimator plugins
//!
//! Two interchangeable binary classifiers sit behind the [`Estimator`] trait:
//! an L2-regularized logistic regression and a gradient-boosted tree ensemble.
//! The pipeline only sees the trait; hyperparameters travel as
//! [`EstimatorParams`] so a grid can enumerate them and an artifact can store them.

mod boosted;
mod logistic;

pub use boosted::{BoostingParams, GradientBoostedTrees};
pub use logistic::LogisticRegression;

use crate::{Error, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A fitted binary classifier
pub trait Estimator: Send + Sync {
    /// Class-1 probability per row
    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64>;

    /// Non-negative importance per input column (larger = more important)
    fn feature_importances(&self) -> Array1<f64>;
}

/// Hyperparameters of one estimator candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorParams {
    /// L2 logistic regression
    Logistic {
        /// Inverse regularization strength
        c: f64,
        /// Newton iteration cap
        max_iter: usize,
    },
    /// Gradient-boosted trees
    Boosted(BoostingParams),
}

impl EstimatorParams {
    /// Logistic regression with the default iteration cap
    #[must_use]
    pub const fn logistic(c: f64) -> Self {
        Self::Logistic { c, max_iter: 1000 }
    }

    /// Check the values without fitting anything
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first unusable value
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Logistic { c, max_iter } => {
                if !(*c > 0.0 && c.is_finite()) {
                    return Err(Error::InvalidConfig(format!(
                        "logistic C must be positive and finite, got {c}"
                    )));
                }
                if *max_iter == 0 {
                    return Err(Error::InvalidConfig(
                        "logistic max_iter must be at least 1".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Boosted(params) => params.validate(),
        }
    }

    /// Fit an estimator with these parameters
    ///
    /// # Errors
    /// Returns error if the parameters are invalid or the data is unusable
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<u8>) -> Result<FittedEstimator> {
        match self {
            Self::Logistic { c, max_iter } => {
                LogisticRegression::fit(x, y, *c, *max_iter).map(FittedEstimator::Logistic)
            }
            Self::Boosted(params) => {
                GradientBoostedTrees::fit(x, y, params).map(FittedEstimator::Boosted)
            }
        }
    }
}

impl fmt::Display for EstimatorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logistic { c, .. } => write!(f, "logistic(C={c})"),
            Self::Boosted(p) => write!(
                f,
                "boosted(n_estimators={}, max_depth={}, learning_rate={}, subsample={}, colsample_bytree={})",
                p.n_estimators, p.max_depth, p.learning_rate, p.subsample, p.colsample_bytree
            ),
        }
    }
}

/// A fitted estimator of either family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "model", rename_all = "snake_case")]
pub enum FittedEstimator {
    /// Fitted logistic regression
    Logistic(LogisticRegression),
    /// Fitted boosted ensemble
    Boosted(GradientBoostedTrees),
}

impl Estimator for FittedEstimator {
    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        match self {
            Self::Logistic(m) => m.predict_proba(x),
            Self::Boosted(m) => m.predict_proba(x),
        }
    }

    fn feature_importances(&self) -> Array1<f64> {
        match self {
            Self::Logistic(m) => m.feature_importances(),
            Self::Boosted(m) => m.feature_importances(),
        }
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
