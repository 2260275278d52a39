//! L2-regularized logistic regression
//!
//! Minimizes `0.5 * ||w||^2 + C * sum(log(1 + exp(-y_i * (w.x_i + b))))` with
//! damped Newton steps. The intercept is not penalized.

use super::{sigmoid, Estimator};
use crate::{Error, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

const TOLERANCE: f64 = 1e-8;

/// Fitted logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    coef: Array1<f64>,
    intercept: f64,
    c: f64,
    iterations: usize,
}

impl LogisticRegression {
    /// Fit on a numeric matrix and 0/1 labels
    ///
    /// # Errors
    /// Returns error if `c <= 0`, shapes disagree, or the matrix has `NaN`
    pub fn fit(x: &Array2<f64>, y: &Array1<u8>, c: f64, max_iter: usize) -> Result<Self> {
        if !(c > 0.0 && c.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "logistic C must be positive and finite, got {c}"
            )));
        }
        if x.nrows() != y.len() {
            return Err(Error::ShapeMismatch {
                stage: "logistic fit".to_string(),
                expected: x.nrows(),
                found: y.len(),
            });
        }
        if x.iter().any(|v| v.is_nan()) {
            return Err(Error::MissingValues {
                stage: "logistic fit".to_string(),
                count: x.iter().filter(|v| v.is_nan()).count(),
            });
        }

        let d = x.ncols();
        let target: Array1<f64> = y.mapv(f64::from);
        let mut w = Array1::<f64>::zeros(d);
        let mut b = 0.0;
        let mut objective = penalized_loss(x, &target, &w, b, c);
        let mut iterations = 0;

        while iterations < max_iter {
            iterations += 1;

            let p = (x.dot(&w) + b).mapv(sigmoid);
            let residual = &p - &target;
            let weight = p.mapv(|pi| (pi * (1.0 - pi)).max(1e-12));

            // Gradient over [w, b]
            let mut grad = vec![0.0; d + 1];
            let xr = x.t().dot(&residual);
            for j in 0..d {
                grad[j] = c.mul_add(xr[j], w[j]);
            }
            grad[d] = c * residual.sum();

            // Hessian over [w, b]
            let weighted = x * &weight.view().insert_axis(Axis(1));
            let xtwx = x.t().dot(&weighted);
            let xtw = weighted.sum_axis(Axis(0));
            let mut hessian = vec![0.0; (d + 1) * (d + 1)];
            for i in 0..d {
                for j in 0..d {
                    hessian[i * (d + 1) + j] = c * xtwx[[i, j]];
                }
                hessian[i * (d + 1) + i] += 1.0;
                hessian[i * (d + 1) + d] = c * xtw[i];
                hessian[d * (d + 1) + i] = c * xtw[i];
            }
            hessian[d * (d + 1) + d] = c * weight.sum();

            let step = solve_spd(&mut hessian, &grad, d + 1).ok_or_else(|| {
                Error::Other("logistic fit: Newton system is singular".to_string())
            })?;

            // Backtracking on the penalized objective
            let mut alpha = 1.0;
            let mut accepted = false;
            for _ in 0..30 {
                let w_new = &w - &(Array1::from(step[..d].to_vec()) * alpha);
                let b_new = alpha.mul_add(-step[d], b);
                let candidate = penalized_loss(x, &target, &w_new, b_new, c);
                if candidate <= objective {
                    w = w_new;
                    b = b_new;
                    objective = candidate;
                    accepted = true;
                    break;
                }
                alpha /= 2.0;
            }

            let max_step = step.iter().fold(0.0_f64, |m, s| m.max(s.abs())) * alpha;
            if !accepted || max_step < TOLERANCE {
                break;
            }
        }

        tracing::trace!(c, iterations, objective, "Fitted logistic regression");

        Ok(Self {
            coef: w,
            intercept: b,
            c,
            iterations,
        })
    }

    /// Coefficients per column
    #[must_use]
    pub const fn coefficients(&self) -> &Array1<f64> {
        &self.coef
    }

    /// Intercept term
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Regularization parameter the model was fit with
    #[must_use]
    pub const fn c(&self) -> f64 {
        self.c
    }

    /// Newton iterations used
    #[must_use]
    pub const fn iterations(&self) -> usize {
        self.iterations
    }

    /// Linear score `w.x + b` per row
    #[must_use]
    pub fn decision_function(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.coef) + self.intercept
    }
}

impl Estimator for LogisticRegression {
    fn predict_proba(&self, x: &Array2<f64>) -> Array1<f64> {
        self.decision_function(x).mapv(sigmoid)
    }

    fn feature_importances(&self) -> Array1<f64> {
        self.coef.mapv(f64::abs)
    }
}

fn penalized_loss(x: &Array2<f64>, target: &Array1<f64>, w: &Array1<f64>, b: f64, c: f64) -> f64 {
    let z = x.dot(w) + b;
    let loss: f64 = z
        .iter()
        .zip(target.iter())
        .map(|(&zi, &ti)| {
            // log(1 + exp(-s * z)) with s in {-1, 1}
            let m = if ti > 0.5 { -zi } else { zi };
            if m > 0.0 {
                m + (-m).exp().ln_1p()
            } else {
                m.exp().ln_1p()
            }
        })
        .sum();
    0.5f64.mul_add(w.dot(w), c * loss)
}

/// Cholesky solve of `A x = b` for a symmetric positive-definite `n x n` matrix
/// stored row-major. `a` is overwritten with its factor.
fn solve_spd(a: &mut [f64], b: &[f64], n: usize) -> Option<Vec<f64>> {
    for j in 0..n {
        let mut diag = a[j * n + j];
        for k in 0..j {
            diag -= a[j * n + k] * a[j * n + k];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return None;
        }
        let diag = diag.sqrt();
        a[j * n + j] = diag;
        for i in (j + 1)..n {
            let mut v = a[i * n + j];
            for k in 0..j {
                v -= a[i * n + k] * a[j * n + k];
            }
            a[i * n + j] = v / diag;
        }
    }

    // Forward: L z = b
    let mut z = vec![0.0; n];
    for i in 0..n {
        let mut v = b[i];
        for k in 0..i {
            v -= a[i * n + k] * z[k];
        }
        z[i] = v / a[i * n + i];
    }
    // Backward: L^T x = z
    let mut out = vec![0.0; n];
    for i in (0..n).rev() {
        let mut v = z[i];
        for k in (i + 1)..n {
            v -= a[k * n + i] * out[k];
        }
        out[i] = v / a[i * n + i];
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::roc_auc;
    use ndarray::array;

    fn separable() -> (Array2<f64>, Array1<u8>) {
        let x = array![
            [-2.0, 0.1],
            [-1.5, -0.3],
            [-1.0, 0.2],
            [-0.5, 0.0],
            [0.5, 0.1],
            [1.0, -0.2],
            [1.5, 0.3],
            [2.0, 0.0],
        ];
        (x, array![0, 0, 0, 0, 1, 1, 1, 1])
    }

    #[test]
    fn test_separates_linear_data() {
        let (x, y) = separable();
        let model = LogisticRegression::fit(&x, &y, 1.0, 100).unwrap();
        let proba = model.predict_proba(&x);
        let auc = roc_auc(y.as_slice().unwrap(), proba.as_slice().unwrap()).unwrap();
        assert!((auc - 1.0).abs() < 1e-12);
        assert!(model.coefficients()[0] > 0.0);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_stronger_regularization_shrinks_coefficients() {
        let (x, y) = separable();
        let weak = LogisticRegression::fit(&x, &y, 10.0, 100).unwrap();
        let strong = LogisticRegression::fit(&x, &y, 0.01, 100).unwrap();
        assert!(strong.coefficients()[0].abs() < weak.coefficients()[0].abs());
    }

    #[test]
    fn test_importance_tracks_informative_column() {
        let (x, y) = separable();
        let model = LogisticRegression::fit(&x, &y, 1.0, 100).unwrap();
        let imp = model.feature_importances();
        assert!(imp[0] > imp[1]);
    }

    #[test]
    fn test_rejects_bad_c_and_nan() {
        let (x, y) = separable();
        assert!(LogisticRegression::fit(&x, &y, 0.0, 100).is_err());
        let mut with_nan = x;
        with_nan[[0, 0]] = f64::NAN;
        assert!(LogisticRegression::fit(&with_nan, &y, 1.0, 100).is_err());
    }

    #[test]
    fn test_cholesky_solve() {
        let mut a = vec![4.0, 2.0, 2.0, 3.0];
        let x = solve_spd(&mut a, &[2.0, 1.0], 2).unwrap();
        // [4 2; 2 3] x = [2; 1] -> x = [0.5, 0]
        assert!((x[0] - 0.5).abs() < 1e-12);
        assert!(x[1].abs() < 1e-12);
    }
}
