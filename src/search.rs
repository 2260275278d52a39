//! Hyperparameter search under cross-validation
//!
//! [`GridSearch`] scores every (candidate, fold) pair as an independent job:
//! fit a fresh pipeline on the fold's training rows, score ROC AUC on its
//! held-out rows. Jobs run on rayon when the `rayon` feature is enabled;
//! results are collected in job order either way, so the outcome is identical
//! with and without parallelism.
//!
//! Tie rule: the first candidate (in grid order) with the maximal mean wins.
//!
//! [`NestedCrossValidation`] wraps a full grid search inside each outer
//! training split, giving a performance estimate that the hyperparameter
//! choice has not seen.

use crate::cv::{Fold, StratifiedKFold};
use crate::dataset::Dataset;
use crate::estimator::{BoostingParams, EstimatorParams};
use crate::pipeline::{Pipeline, PipelineSpec};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Regularization values searched for logistic regression
pub const DEFAULT_LOGISTIC_C: [f64; 9] = [0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 20.0, 100.0];

/// Ordered hyperparameter axes for one estimator family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ParamGrid {
    /// Logistic regression over `c`
    Logistic {
        /// Inverse regularization values
        c: Vec<f64>,
        /// Newton iteration cap
        max_iter: usize,
    },
    /// Boosted trees over five axes
    Boosted {
        /// Tree counts
        n_estimators: Vec<usize>,
        /// Depth caps
        max_depth: Vec<usize>,
        /// Shrinkage values
        learning_rate: Vec<f64>,
        /// Row fractions
        subsample: Vec<f64>,
        /// Column fractions
        colsample_bytree: Vec<f64>,
        /// Subsampling seed
        seed: u64,
    },
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self::logistic_default()
    }
}

impl ParamGrid {
    /// Logistic grid over [`DEFAULT_LOGISTIC_C`]
    #[must_use]
    pub fn logistic_default() -> Self {
        Self::Logistic {
            c: DEFAULT_LOGISTIC_C.to_vec(),
            max_iter: 1000,
        }
    }

    /// Boosted-tree grid (243 candidates)
    #[must_use]
    pub fn boosted_default(seed: u64) -> Self {
        Self::Boosted {
            n_estimators: vec![50, 100, 200],
            max_depth: vec![3, 5, 7],
            learning_rate: vec![0.01, 0.1, 0.2],
            subsample: vec![0.6, 0.8, 1.0],
            colsample_bytree: vec![0.6, 0.8, 1.0],
            seed,
        }
    }

    /// Number of candidates
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Logistic { c, .. } => c.len(),
            Self::Boosted {
                n_estimators,
                max_depth,
                learning_rate,
                subsample,
                colsample_bytree,
                ..
            } => {
                n_estimators.len()
                    * max_depth.len()
                    * learning_rate.len()
                    * subsample.len()
                    * colsample_bytree.len()
            }
        }
    }

    /// Whether the grid has no candidates
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product of the axes, last axis varying fastest
    #[must_use]
    pub fn candidates(&self) -> Vec<EstimatorParams> {
        match self {
            Self::Logistic { c, max_iter } => c
                .iter()
                .map(|&c| EstimatorParams::Logistic {
                    c,
                    max_iter: *max_iter,
                })
                .collect(),
            Self::Boosted {
                n_estimators,
                max_depth,
                learning_rate,
                subsample,
                colsample_bytree,
                seed,
            } => {
                let mut out = Vec::with_capacity(self.len());
                for &n in n_estimators {
                    for &depth in max_depth {
                        for &lr in learning_rate {
                            for &rows in subsample {
                                for &cols in colsample_bytree {
                                    out.push(EstimatorParams::Boosted(BoostingParams {
                                        n_estimators: n,
                                        max_depth: depth,
                                        learning_rate: lr,
                                        subsample: rows,
                                        colsample_bytree: cols,
                                        seed: *seed,
                                    }));
                                }
                            }
                        }
                    }
                }
                out
            }
        }
    }
}

/// Which population the cross-validated scores describe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorePopulation {
    /// Folds drawn from the observed rows
    Natural,
    /// Folds drawn from oversampled data, synthetic rows included
    Balanced,
}

/// Cross-validated score of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Candidate hyperparameters
    pub params: EstimatorParams,
    /// Mean fold AUC
    pub mean: f64,
    /// Population standard deviation of fold AUC
    pub std: f64,
    /// AUC per fold, in fold order
    pub fold_scores: Vec<f64>,
}

/// Outcome of a grid search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Winning hyperparameters
    pub best_params: EstimatorParams,
    /// Mean CV AUC of the winner
    pub best_score: f64,
    /// Grid index of the winner
    pub best_index: usize,
    /// Every candidate, in grid order
    pub candidates: Vec<CandidateScore>,
    /// Population the scores describe
    pub population: ScorePopulation,
    /// Winner refit on all rows
    pub pipeline: Pipeline,
}

/// Grid search with stratified cross-validation and ROC AUC scoring
#[derive(Debug, Clone)]
pub struct GridSearch {
    grid: ParamGrid,
    spec: PipelineSpec,
    cv: StratifiedKFold,
    population: ScorePopulation,
}

impl GridSearch {
    /// Create a search over `grid` with a fixed pipeline shape
    #[must_use]
    pub const fn new(grid: ParamGrid, spec: PipelineSpec, cv: StratifiedKFold) -> Self {
        Self {
            grid,
            spec,
            cv,
            population: ScorePopulation::Natural,
        }
    }

    /// Tag the scores with the population they are computed on
    #[must_use]
    pub const fn population(mut self, population: ScorePopulation) -> Self {
        self.population = population;
        self
    }

    /// Grid being searched
    #[must_use]
    pub const fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    /// Score every candidate and refit the best on all rows
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for an empty grid
    /// - `EmptyFold` when a class cannot fill every fold
    /// - any pipeline fit error from a job
    pub fn fit(&self, data: &Dataset) -> Result<SearchResult> {
        let candidates = self.grid.candidates();
        if candidates.is_empty() {
            return Err(Error::InvalidConfig("parameter grid has no candidates".to_string()));
        }

        let folds = self.cv.split(&data.labels().to_vec())?;
        let jobs: Vec<(usize, &Fold)> = (0..candidates.len())
            .flat_map(|c| folds.iter().map(move |f| (c, f)))
            .collect();

        let run_job = |&(c, fold): &(usize, &Fold)| -> Result<f64> {
            let train = data.subset(&fold.train);
            let test = data.subset(&fold.test);
            let pipeline = Pipeline::fit(&self.spec, &candidates[c], train.features(), train.labels())?;
            pipeline.score(test.features(), test.labels())
        };

        #[cfg(feature = "rayon")]
        let scores: Vec<f64> = jobs.par_iter().map(run_job).collect::<Result<_>>()?;
        #[cfg(not(feature = "rayon"))]
        let scores: Vec<f64> = jobs.iter().map(run_job).collect::<Result<_>>()?;

        let n_folds = folds.len();
        let scored: Vec<CandidateScore> = candidates
            .iter()
            .zip(scores.chunks(n_folds))
            .map(|(params, fold_scores)| {
                let (mean, std) = mean_std(fold_scores);
                debug!(candidate = %params, mean_auc = mean, std_auc = std, "Scored candidate");
                CandidateScore {
                    params: params.clone(),
                    mean,
                    std,
                    fold_scores: fold_scores.to_vec(),
                }
            })
            .collect();

        let mut best_index = 0;
        for (i, candidate) in scored.iter().enumerate() {
            if candidate.mean > scored[best_index].mean {
                best_index = i;
            }
        }
        let best_params = scored[best_index].params.clone();
        let best_score = scored[best_index].mean;

        info!(
            best = %best_params,
            best_auc = best_score,
            candidates = scored.len(),
            folds = n_folds,
            population = ?self.population,
            "Grid search finished"
        );

        let pipeline = Pipeline::fit(&self.spec, &best_params, data.features(), data.labels())?;

        Ok(SearchResult {
            best_params,
            best_score,
            best_index,
            candidates: scored,
            population: self.population,
            pipeline,
        })
    }
}

/// Outcome of nested cross-validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedResult {
    /// Outer-fold AUC of each fold's refit winner
    pub fold_scores: Vec<f64>,
    /// Hyperparameters chosen inside each outer fold
    pub chosen_params: Vec<EstimatorParams>,
    /// Mean outer AUC
    pub mean: f64,
    /// Population standard deviation of outer AUC
    pub std: f64,
    /// Population the scores describe
    pub population: ScorePopulation,
}

/// Outer stratified folds around an inner grid search
#[derive(Debug, Clone)]
pub struct NestedCrossValidation {
    outer: StratifiedKFold,
    inner: GridSearch,
}

impl NestedCrossValidation {
    /// Create a nested evaluation
    #[must_use]
    pub const fn new(outer: StratifiedKFold, inner: GridSearch) -> Self {
        Self { outer, inner }
    }

    /// Run the inner search on each outer training split and score its refit
    /// winner on the outer held-out split
    ///
    /// # Errors
    /// Propagates fold and fit errors from either level
    pub fn evaluate(&self, data: &Dataset) -> Result<NestedResult> {
        let folds = self.outer.split(&data.labels().to_vec())?;
        let mut fold_scores = Vec::with_capacity(folds.len());
        let mut chosen_params = Vec::with_capacity(folds.len());

        for fold in &folds {
            let train = data.subset(&fold.train);
            let test = data.subset(&fold.test);
            let inner = self.inner.fit(&train)?;
            let auc = inner.pipeline.score(test.features(), test.labels())?;
            debug!(
                fold = fold.index,
                chosen = %inner.best_params,
                inner_auc = inner.best_score,
                outer_auc = auc,
                "Outer fold scored"
            );
            fold_scores.push(auc);
            chosen_params.push(inner.best_params);
        }

        let (mean, std) = mean_std(&fold_scores);
        info!(mean_auc = mean, std_auc = std, folds = folds.len(), "Nested cross-validation finished");

        Ok(NestedResult {
            fold_scores,
            chosen_params,
            mean,
            std,
            population: self.inner.population,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}
