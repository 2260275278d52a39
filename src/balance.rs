//! Synthetic minority oversampling
//!
//! New minority rows are interpolated between a minority sample and one of its
//! k nearest minority neighbors until both classes have the majority count.
//!
//! Runs on imputed data only. Scores measured on balanced data describe the
//! balanced population, not real-world prevalence.

use crate::dataset::Dataset;
use crate::{Error, Result};
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Default neighborhood size
pub const DEFAULT_K_NEIGHBORS: usize = 5;

/// SMOTE-style class balancer
#[derive(Debug, Clone, Copy)]
pub struct SmoteBalancer {
    k_neighbors: usize,
    seed: u64,
}

impl Default for SmoteBalancer {
    fn default() -> Self {
        Self::new(DEFAULT_K_NEIGHBORS, 42)
    }
}

impl SmoteBalancer {
    /// Create a balancer with a neighborhood size and RNG seed
    #[must_use]
    pub const fn new(k_neighbors: usize, seed: u64) -> Self {
        Self { k_neighbors, seed }
    }

    /// Configured neighborhood size
    #[must_use]
    pub const fn k_neighbors(&self) -> usize {
        self.k_neighbors
    }

    /// Oversample the minority class until class counts are equal.
    ///
    /// Original rows are returned first, unchanged and in order; synthetic rows
    /// follow. Input that is already balanced is returned as-is.
    ///
    /// # Errors
    ///
    /// - `MissingValues` if the matrix contains `NaN`
    /// - `InsufficientMinority` if the minority class has fewer than two rows
    /// - `InvalidConfig` if `k_neighbors` is zero
    pub fn balance(&self, data: &Dataset) -> Result<Dataset> {
        if self.k_neighbors == 0 {
            return Err(Error::InvalidConfig("k_neighbors must be at least 1".to_string()));
        }
        let missing = data.missing_count();
        if missing > 0 {
            return Err(Error::MissingValues {
                stage: "oversampling".to_string(),
                count: missing,
            });
        }

        let [negatives, positives] = data.class_counts();
        if negatives == positives {
            return Ok(data.clone());
        }
        let (minority_label, minority_count, majority_count) = if positives < negatives {
            (1u8, positives, negatives)
        } else {
            (0u8, negatives, positives)
        };

        if minority_count < 2 {
            return Err(Error::InsufficientMinority(format!(
                "class {minority_label} has {minority_count} example(s); at least 2 are needed to interpolate"
            )));
        }

        let k = if minority_count <= self.k_neighbors {
            let adjusted = minority_count - 1;
            tracing::warn!(
                requested = self.k_neighbors,
                adjusted,
                minority_count,
                "Minority class smaller than neighborhood; reducing k_neighbors"
            );
            adjusted
        } else {
            self.k_neighbors
        };

        let x = data.features();
        let minority: Vec<usize> = data
            .labels()
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == minority_label)
            .map(|(i, _)| i)
            .collect();
        let minority_x = x.select(Axis(0), &minority);
        let neighbors = nearest_neighbors(&minority_x, k);

        let n_synthetic = majority_count - minority_count;
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut synthetic = Array2::<f64>::zeros((n_synthetic, x.ncols()));

        for (s, mut row) in synthetic.axis_iter_mut(Axis(0)).enumerate() {
            let base = s % minority_count;
            let neighbor = neighbors[base][rng.gen_range(0..k)];
            let gap: f64 = rng.gen();
            let origin = minority_x.row(base);
            let target = minority_x.row(neighbor);
            for ((out, &a), &b) in row.iter_mut().zip(origin.iter()).zip(target.iter()) {
                *out = (b - a).mul_add(gap, a);
            }
        }

        let features = concatenate(Axis(0), &[x.view(), synthetic.view()])
            .map_err(|e| Error::Other(format!("oversampling concatenate failed: {e}")))?;
        let mut labels = data.labels().to_vec();
        labels.extend(std::iter::repeat(minority_label).take(n_synthetic));

        tracing::info!(
            minority_label,
            minority_count,
            majority_count,
            synthetic = n_synthetic,
            k,
            "Balanced classes"
        );

        Dataset::new(features, Array1::from(labels), data.schema().clone())
    }
}

/// For each row, indices of its `k` nearest other rows (Euclidean; ties by index)
fn nearest_neighbors(x: &Array2<f64>, k: usize) -> Vec<Vec<usize>> {
    let n = x.nrows();
    (0..n)
        .map(|i| {
            let row = x.row(i);
            let mut distances: Vec<(f64, usize)> = (0..n)
                .filter(|&j| j != i)
                .map(|j| (squared_distance(row, x.row(j)), j))
                .collect();
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FeatureSchema;
    use ndarray::array;

    fn imbalanced() -> Dataset {
        let x = array![
            [0.0, 0.0],
            [1.0, 0.0],
            [2.0, 0.0],
            [3.0, 0.0],
            [4.0, 0.0],
            [5.0, 0.0],
            [10.0, 10.0],
            [11.0, 10.0],
            [10.0, 11.0],
        ];
        let y = array![0, 0, 0, 0, 0, 0, 1, 1, 1];
        Dataset::new(x, y, FeatureSchema::new(["a", "b"]).unwrap()).unwrap()
    }

    #[test]
    fn test_counts_equal_and_originals_kept() {
        let data = imbalanced();
        let balanced = SmoteBalancer::new(5, 42).balance(&data).unwrap();

        assert_eq!(balanced.n_rows(), 12);
        assert_eq!(balanced.class_counts(), [6, 6]);
        for i in 0..data.n_rows() {
            assert_eq!(balanced.features().row(i), data.features().row(i));
            assert_eq!(balanced.labels()[i], data.labels()[i]);
        }
    }

    #[test]
    fn test_synthetic_rows_lie_between_minority_points() {
        let balanced = SmoteBalancer::new(2, 7).balance(&imbalanced()).unwrap();
        for row in balanced.features().rows().into_iter().skip(9) {
            assert!((10.0..=11.0).contains(&row[0]));
            assert!((10.0..=11.0).contains(&row[1]));
        }
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = SmoteBalancer::new(2, 9).balance(&imbalanced()).unwrap();
        let b = SmoteBalancer::new(2, 9).balance(&imbalanced()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_missing_values() {
        let x = array![[f64::NAN], [1.0], [2.0]];
        let data = Dataset::new(x, array![0, 0, 1], FeatureSchema::new(["a"]).unwrap()).unwrap();
        let err = SmoteBalancer::default().balance(&data).unwrap_err();
        assert!(matches!(err, Error::MissingValues { count: 1, .. }));
    }

    #[test]
    fn test_single_minority_example_fails() {
        let x = array![[0.0], [1.0], [2.0]];
        let data = Dataset::new(x, array![0, 0, 1], FeatureSchema::new(["a"]).unwrap()).unwrap();
        assert!(matches!(
            SmoteBalancer::default().balance(&data),
            Err(Error::InsufficientMinority(_))
        ));
    }

    #[test]
    fn test_already_balanced_unchanged() {
        let x = array![[0.0], [1.0]];
        let data = Dataset::new(x, array![0, 1], FeatureSchema::new(["a"]).unwrap()).unwrap();
        assert_eq!(SmoteBalancer::default().balance(&data).unwrap(), data);
    }
}
