//! Leakage-safe preprocessing
//!
//! Both transforms are fit on training rows only and then applied, with the
//! same stored statistics, to any other rows including inference inputs.

use crate::{Error, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Imputation strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputeStrategy {
    /// Per-column median of observed values
    #[default]
    Median,
    /// Per-column mean of observed values
    Mean,
}

/// Per-column imputer for `NaN` cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Imputer {
    strategy: ImputeStrategy,
    fill: Array1<f64>,
}

impl Imputer {
    /// Fit fill values on training rows
    ///
    /// # Errors
    /// Returns error if a column has no observed values
    pub fn fit(x: &Array2<f64>, strategy: ImputeStrategy) -> Result<Self> {
        let fill = x
            .axis_iter(Axis(1))
            .enumerate()
            .map(|(col, values)| {
                let stat = match strategy {
                    ImputeStrategy::Median => median(values),
                    ImputeStrategy::Mean => mean(values),
                };
                stat.ok_or_else(|| Error::EmptyColumn(format!("column {col} (imputation)")))
            })
            .collect::<Result<Vec<f64>>>()?;

        Ok(Self {
            strategy,
            fill: Array1::from(fill),
        })
    }

    /// Fitted fill value per column
    #[must_use]
    pub const fn statistics(&self) -> &Array1<f64> {
        &self.fill
    }

    /// Strategy the statistics were computed with
    #[must_use]
    pub const fn strategy(&self) -> ImputeStrategy {
        self.strategy
    }

    /// Replace `NaN` cells with fitted values
    ///
    /// # Errors
    /// Returns error on column-count mismatch
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_columns("imputer", self.fill.len(), x.ncols())?;
        let mut out = x.clone();
        for (mut column, &fill) in out.axis_iter_mut(Axis(1)).zip(self.fill.iter()) {
            column.mapv_inplace(|v| if v.is_nan() { fill } else { v });
        }
        Ok(out)
    }
}

/// Zero-mean, unit-variance scaling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f64>,
    scale: Array1<f64>,
}

impl StandardScaler {
    /// Fit means and population standard deviations on training rows.
    ///
    /// Constant columns get scale 1.0 so they map to zero instead of dividing by zero.
    ///
    /// # Errors
    /// Returns error if the matrix has no rows or contains `NaN`
    #[allow(clippy::cast_precision_loss)]
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(Error::InvalidInput("cannot fit scaler on zero rows".to_string()));
        }
        let missing = x.iter().filter(|v| v.is_nan()).count();
        if missing > 0 {
            return Err(Error::MissingValues {
                stage: "scaler fit".to_string(),
                count: missing,
            });
        }

        let n = x.nrows() as f64;
        let mean = x.sum_axis(Axis(0)) / n;
        let scale = x
            .axis_iter(Axis(1))
            .zip(mean.iter())
            .map(|(col, &m)| {
                let var = col.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / n;
                let sd = var.sqrt();
                if sd > f64::EPSILON {
                    sd
                } else {
                    1.0
                }
            })
            .collect::<Array1<f64>>();

        Ok(Self { mean, scale })
    }

    /// Fitted column means
    #[must_use]
    pub const fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Fitted column scales
    #[must_use]
    pub const fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Apply `(x - mean) / scale`
    ///
    /// # Errors
    /// Returns error on column-count mismatch
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_columns("scaler", self.mean.len(), x.ncols())?;
        Ok((x - &self.mean) / &self.scale)
    }
}

fn check_columns(stage: &str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            stage: stage.to_string(),
            expected,
            found,
        })
    }
}

fn median(values: ArrayView1<'_, f64>) -> Option<f64> {
    let mut observed: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if observed.is_empty() {
        return None;
    }
    observed.sort_by(f64::total_cmp);
    let mid = observed.len() / 2;
    if observed.len() % 2 == 0 {
        Some((observed[mid - 1] + observed[mid]) / 2.0)
    } else {
        Some(observed[mid])
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: ArrayView1<'_, f64>) -> Option<f64> {
    let observed: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if observed.is_empty() {
        None
    } else {
        Some(observed.iter().sum::<f64>() / observed.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_median_imputation() {
        let x = array![[1.0, f64::NAN], [f64::NAN, 4.0], [3.0, 8.0], [5.0, 6.0]];
        let imputer = Imputer::fit(&x, ImputeStrategy::Median).unwrap();
        assert_eq!(imputer.statistics(), &array![3.0, 6.0]);

        let out = imputer.transform(&x).unwrap();
        assert!((out[[1, 0]] - 3.0).abs() < f64::EPSILON);
        assert!((out[[0, 1]] - 6.0).abs() < f64::EPSILON);
        assert!((out[[2, 1]] - 8.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_mean_imputation() {
        let x = array![[1.0], [f64::NAN], [5.0]];
        let imputer = Imputer::fit(&x, ImputeStrategy::Mean).unwrap();
        assert!((imputer.statistics()[0] - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_all_missing_column_fails() {
        let x = array![[1.0, f64::NAN], [2.0, f64::NAN]];
        let err = Imputer::fit(&x, ImputeStrategy::Median).unwrap_err();
        assert!(err.to_string().contains("column 1"));
    }

    #[test]
    fn test_scaler_zero_mean_unit_variance() {
        let x = array![[1.0, 10.0], [3.0, 10.0]];
        let scaler = StandardScaler::fit(&x).unwrap();
        assert_eq!(scaler.mean(), &array![2.0, 10.0]);
        assert_eq!(scaler.scale(), &array![1.0, 1.0]);

        let out = scaler.transform(&x).unwrap();
        assert_eq!(out, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_fitted_statistics_reused_on_new_rows() {
        let train = array![[0.0], [2.0]];
        let scaler = StandardScaler::fit(&train).unwrap();
        let held_out = array![[100.0]];
        let out = scaler.transform(&held_out).unwrap();
        assert!((out[[0, 0]] - 99.0).abs() < 1e-12);
        assert_eq!(scaler.mean(), &array![1.0]);
    }

    #[test]
    fn test_column_mismatch() {
        let scaler = StandardScaler::fit(&array![[1.0, 2.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&array![[1.0]]),
            Err(Error::ShapeMismatch { expected: 2, found: 1, .. })
        ));
    }
}
