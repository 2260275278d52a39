//! Quantile threshold labeling
//!
//! Binarizes a continuous severity measure: rows at or above the empirical
//! q-th quantile are positive. Missing values never count as positive.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Outcome of label derivation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelSummary {
    /// Quantile fraction used
    pub quantile: f64,
    /// Threshold value at that quantile
    pub threshold: f64,
    /// Rows labeled 1
    pub positives: usize,
    /// Rows labeled 0
    pub negatives: usize,
}

impl LabelSummary {
    /// Fraction of rows labeled positive
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn positive_fraction(&self) -> f64 {
        let total = self.positives + self.negatives;
        if total == 0 {
            0.0
        } else {
            self.positives as f64 / total as f64
        }
    }
}

/// Empirical quantile of the non-missing values.
///
/// Uses linear interpolation between order statistics at position `(n - 1) * q`,
/// which is the convention of the common dataframe libraries.
///
/// # Errors
///
/// Returns error if `q` is outside `[0, 1]` or every value is missing
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn quantile(values: &[f64], q: f64, column: &str) -> Result<f64> {
    if !(0.0..=1.0).contains(&q) {
        return Err(Error::InvalidInput(format!("quantile {q} outside [0, 1]")));
    }

    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return Err(Error::EmptyColumn(column.to_string()));
    }
    sorted.sort_by(f64::total_cmp);

    let pos = (sorted.len() - 1) as f64 * q;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Ok((sorted[upper] - sorted[lower]).mul_add(frac, sorted[lower]))
}

/// Derive binary labels from a severity column.
///
/// label = 1 if value >= q-th quantile, else 0. Ties at the threshold are
/// positive. Deterministic and side-effect free.
///
/// # Errors
///
/// - `InvalidConfig` if `q` is not strictly inside `(0, 1)`
/// - `EmptyColumn` if the column has no valid values
/// - `DegenerateLabel` if every row lands in one class
pub fn derive_labels(values: &[f64], q: f64, column: &str) -> Result<(Vec<u8>, LabelSummary)> {
    if !(q > 0.0 && q < 1.0) {
        return Err(Error::InvalidConfig(format!(
            "label quantile must be in (0, 1), got {q}"
        )));
    }

    let threshold = quantile(values, q, column)?;
    let labels: Vec<u8> = values.iter().map(|&v| u8::from(v >= threshold)).collect();

    let positives = labels.iter().filter(|&&l| l == 1).count();
    let negatives = labels.len() - positives;

    if positives == 0 || negatives == 0 {
        return Err(Error::DegenerateLabel {
            threshold,
            class: u8::from(positives > 0),
            count: labels.len(),
        });
    }

    tracing::info!(
        column,
        quantile = q,
        threshold,
        positives,
        negatives,
        "Derived labels"
    );

    Ok((
        labels,
        LabelSummary {
            quantile: q,
            threshold,
            positives,
            negatives,
        },
    ))
}
