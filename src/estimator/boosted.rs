//! Gradient-boosted regression trees on the logistic loss
//!
//! Second-order boosting: each tree is grown on per-row gradients and hessians,
//! leaf weight `-G / (H + lambda)`, split gain
//! `0.5 * (GL^2/(HL+lambda) + GR^2/(HR+lambda) - G^2/(H+lambda))`.
//! Rows and columns are subsampled per tree with a seeded RNG.

use super::{sigmoid, Estimator};
use crate::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

const LAMBDA: f64 = 1.0;
const MIN_CHILD_HESSIAN: f64 = 1e-3;

/// Boosting hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Shrinkage per tree
    pub learning_rate: f64,
    /// Fraction of rows sampled per tree
    pub subsample: f64,
    /// Fraction of columns sampled per tree
    pub colsample_bytree: f64,
    /// RNG seed for subsampling
    pub seed: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 3,
            learning_rate: 0.1,
            subsample: 1.0,
            colsample_bytree: 1.0,
            seed: 42,
        }
    }
}

impl BoostingParams {
    pub(crate) fn validate(&self) -> Result<()> {
        let fraction_ok = |f: f64| f > 0.0 && f <= 1.0;
        if self.n_estimators == 0 || self.max_depth == 0 {
            return Err(Error::InvalidConfig(
                "boosting needs n_estimators >= 1 and max_depth >= 1".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !fraction_ok(self.subsample) || !fraction_ok(self.colsample_bytree) {
            return Err(Error::InvalidConfig(
                "subsample and colsample_bytree must be in (0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Fitted boosted ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    params: BoostingParams,
    base_score: f64,
    trees: Vec<Tree>,
    gain: Array1<f64>,
}

impl GradientBoostedTrees {
    /// Fit the ensemble
    ///
    /// # Errors
    /// Returns error on invalid parameters, shape mismatch or `NaN` input
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn fit(x: &Array2<f64>, y: &Array1<u8>, params: &BoostingParams) -> Result<Self> {
        params.validate()?;
        if x.nrows() != y.len() || x.nrows() == 0 {
            return Err(Error::ShapeMismatch {
                stage: "boosting fit".to_string(),
                expected: x.nrows(),
                found: y.len(),
            });
        }
        if x.iter().any(|v| v.is_nan()) {
            return Err(Error::MissingValues {
                stage: "boosting fit".to_string(),
                count: x.iter().filter(|v| v.is_nan()).count(),
            });
        }

        let (n, d) = x.dim();
        let target: Vec<f64> = y.iter().map(|&l| f64::from(l)).collect();
        let prior = (target.iter().sum::<f64>() / n as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_score = (prior / (1.0 - prior)).ln();

        let mut margin = vec![base_score; n];
        let mut gain = Array1::<f64>::zeros(d);
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut rng = ChaCha8Rng::seed_from_u64(params.seed);

        let n_rows = ((params.subsample * n as f64).round() as usize).clamp(1, n);
        let n_cols = ((params.colsample_bytree * d as f64).round() as usize).clamp(1, d.max(1));

        for _ in 0..params.n_estimators {
            let grad: Vec<f64> = margin
                .iter()
                .zip(&target)
                .map(|(&m, &t)| sigmoid(m) - t)
                .collect();
            let hess: Vec<f64> = margin
                .iter()
                .map(|&m| {
                    let p = sigmoid(m);
                    (p * (1.0 - p)).max(1e-16)
                })
                .collect();

            let mut rows: Vec<usize> = sample(&mut rng, n, n_rows).into_vec();
            rows.sort_unstable();
            let mut cols: Vec<usize> = if d == 0 {
                Vec::new()
            } else {
                sample(&mut rng, d, n_cols).into_vec()
            };
            cols.sort_unstable();

            let mut builder = TreeBuilder {
                x,
                grad: &grad,
                hess: &hess,
                cols: &cols,
                max_depth: params.max_depth,
                nodes: Vec::new(),
                gain: &mut gain,
            };
            builder.grow(rows, 0);
            let tree = Tree {
                nodes: builder.nodes,
            };

            for (i, m) in margin.iter_mut().enumerate() {
                *m += params.learning_rate * tree.predict_row(x.row(i));
            }
            trees.push(tree);
        }

        tracing::trace!(trees = trees.len(), "Fitted boosted ensemble");

        Ok(Self {
            params: params.clone(),
            base_score,
            trees,
            gain,
        })
    }

    /// Parameters the ensemble was fit with
    #[must_use]
    pub const fn params(&self) -> &BoostingParams {
        &self.params
    }

    /// Number of trees
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn margin(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.trees.iter().fold(self.base_score, |acc, tree| {
            self.params
                .learning_rate
                .mul_add(tree.predict_row(row), acc)
        })
    }
}

impl Estimator for GradientBoostedTrees {
    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        x.rows().into_iter().map(|r| sigmoid(self.margin(r))).collect()
    }

    fn feature_importances(&self) -> Array1<f64> {
        let total = self.gain.sum();
        if total > 0.0 {
            &self.gain / total
        } else {
            self.gain.clone()
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    grad: &'a [f64],
    hess: &'a [f64],
    cols: &'a [usize],
    max_depth: usize,
    nodes: Vec<Node>,
    gain: &'a mut Array1<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl TreeBuilder<'_> {
    /// Grow a subtree over `rows`; returns its node index
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let g: f64 = rows.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = rows.iter().map(|&i| self.hess[i]).sum();
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: -g / (h + LAMBDA),
        });

        if depth >= self.max_depth || rows.len() < 2 {
            return idx;
        }
        let Some(best) = self.best_split(&rows, g, h) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.x[[i, best.feature]] < best.threshold);

        self.gain[best.feature] += best.gain;
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }

    fn best_split(&self, rows: &[usize], g: f64, h: f64) -> Option<BestSplit> {
        let parent = g * g / (h + LAMBDA);
        let mut best: Option<BestSplit> = None;

        for &feature in self.cols {
            let mut sorted: Vec<usize> = rows.to_vec();
            sorted.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let (mut gl, mut hl) = (0.0, 0.0);
            for w in 0..sorted.len() - 1 {
                let i = sorted[w];
                gl += self.grad[i];
                hl += self.hess[i];
                let here = self.x[[i, feature]];
                let next = self.x[[sorted[w + 1], feature]];
                if next <= here {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < MIN_CHILD_HESSIAN || hr < MIN_CHILD_HESSIAN {
                    continue;
                }
                let split_gain =
                    0.5 * (gl * gl / (hl + LAMBDA) + gr * gr / (hr + LAMBDA) - parent);
                if split_gain > 1e-12 && best.as_ref().map_or(true, |b| split_gain > b.gain) {
                    best = Some(BestSplit {
                        feature,
                        threshold: (here + next) / 2.0,
                        gain: split_gain,
                    });
                }
            }
        }
        best
    }
}
