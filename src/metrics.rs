//! Ranking metrics (ROC AUC, ROC curve points) and thresholded
//! precision/recall/F1 for held-out evaluation

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Area under the ROC curve (Mann-Whitney formulation, ties count half).
///
/// # Errors
///
/// Returns error if lengths differ or only one class is present
#[allow(clippy::cast_precision_loss)]
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Result<f64> {
    check_inputs(labels, scores)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    // Average 1-based ranks over tied groups
    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg;
        }
        i = j + 1;
    }

    let positives = labels.iter().filter(|&&l| l == 1).count() as f64;
    let negatives = labels.len() as f64 - positives;
    let rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(&l, _)| l == 1)
        .map(|(_, &r)| r)
        .sum();

    Ok((positives.mul_add(-(positives + 1.0) / 2.0, rank_sum)) / (positives * negatives))
}

/// ROC curve points, one per distinct score threshold (descending)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    /// False positive rate at each threshold
    pub fpr: Vec<f64>,
    /// True positive rate at each threshold
    pub tpr: Vec<f64>,
    /// Score thresholds; the first is `+inf` (nothing predicted positive)
    pub thresholds: Vec<f64>,
}

/// Compute the ROC curve.
///
/// # Errors
///
/// Returns error if lengths differ or only one class is present
#[allow(clippy::cast_precision_loss)]
pub fn roc_curve(labels: &[u8], scores: &[f64]) -> Result<RocCurve> {
    check_inputs(labels, scores)?;

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let positives = labels.iter().filter(|&&l| l == 1).count() as f64;
    let negatives = labels.len() as f64 - positives;

    let mut curve = RocCurve {
        fpr: vec![0.0],
        tpr: vec![0.0],
        thresholds: vec![f64::INFINITY],
    };
    let (mut tp, mut fp) = (0.0, 0.0);
    for (pos, &idx) in order.iter().enumerate() {
        if labels[idx] == 1 {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_group = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[idx]);
        if last_of_group {
            curve.fpr.push(fp / negatives);
            curve.tpr.push(tp / positives);
            curve.thresholds.push(scores[idx]);
        }
    }
    Ok(curve)
}

impl RocCurve {
    /// Trapezoidal area under the curve points
    #[must_use]
    pub fn area(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[0] + y[1]) / 2.0)
            .sum()
    }
}

/// Positive-class precision, recall and F1 at a probability threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    /// Scores at or above this are predicted positive
    pub threshold: f64,
    /// TP / (TP + FP); 0 when nothing is predicted positive
    pub precision: f64,
    /// TP / (TP + FN)
    pub recall: f64,
    /// Harmonic mean of precision and recall; 0 when both are 0
    pub f1: f64,
    /// Fraction of rows classified correctly
    pub accuracy: f64,
    /// Rows per class, `[negatives, positives]`
    pub support: [usize; 2],
}

/// Thresholded report for the positive class.
///
/// # Errors
///
/// Returns error if lengths differ or only one class is present
#[allow(clippy::cast_precision_loss)]
pub fn classification_report(
    labels: &[u8],
    scores: &[f64],
    threshold: f64,
) -> Result<ClassificationReport> {
    check_inputs(labels, scores)?;

    let (mut tp, mut fp, mut fn_, mut tn) = (0usize, 0usize, 0usize, 0usize);
    for (&label, &score) in labels.iter().zip(scores) {
        match (label == 1, score >= threshold) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => tn += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Ok(ClassificationReport {
        threshold,
        precision,
        recall,
        f1,
        accuracy: ratio(tp + tn, labels.len()),
        support: [tn + fp, tp + fn_],
    })
}

/// Evaluation of a fitted model on rows the search never saw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutReport {
    /// Held-out rows scored
    pub rows: usize,
    /// ROC AUC on the held-out rows
    pub auc: f64,
    /// ROC curve points on the held-out rows
    pub roc: RocCurve,
    /// Positive-class precision at the 0.5 threshold
    pub precision: f64,
    /// Positive-class recall at the 0.5 threshold
    pub recall: f64,
    /// Positive-class F1 at the 0.5 threshold
    pub f1: f64,
    /// Full thresholded report
    pub report: ClassificationReport,
}

impl HoldoutReport {
    /// Probability cut used for precision, recall and F1
    pub const THRESHOLD: f64 = 0.5;

    /// Score held-out labels against predicted probabilities
    ///
    /// # Errors
    /// Returns error if lengths differ or only one class is present
    pub fn evaluate(labels: &[u8], probabilities: &[f64]) -> Result<Self> {
        let report = classification_report(labels, probabilities, Self::THRESHOLD)?;
        Ok(Self {
            rows: labels.len(),
            auc: roc_auc(labels, probabilities)?,
            roc: roc_curve(labels, probabilities)?,
            precision: report.precision,
            recall: report.recall,
            f1: report.f1,
            report,
        })
    }
}

fn check_inputs(labels: &[u8], scores: &[f64]) -> Result<()> {
    if labels.len() != scores.len() {
        return Err(Error::ShapeMismatch {
            stage: "roc".to_string(),
            expected: labels.len(),
            found: scores.len(),
        });
    }
    let positives = labels.iter().filter(|&&l| l == 1).count();
    if positives == 0 || positives == labels.len() {
        return Err(Error::InvalidInput(
            "ROC AUC is undefined when only one class is present".to_string(),
        ));
    }
    Ok(())
}
