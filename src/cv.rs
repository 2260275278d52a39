//! Stratified k-fold splitting
//!
//! Each class is shuffled with a seeded RNG and dealt into folds as
//! near-equal contiguous chunks, so every fold keeps the overall class ratio.

use crate::{Error, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// One train/test partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Fold index
    pub index: usize,
    /// Training row indices (ascending)
    pub train: Vec<usize>,
    /// Held-out row indices (ascending)
    pub test: Vec<usize>,
}

/// Stratified k-fold splitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StratifiedKFold {
    n_splits: usize,
    shuffle: bool,
    seed: u64,
}

impl StratifiedKFold {
    /// Create a splitter
    ///
    /// # Errors
    /// Returns error if `n_splits < 2`
    pub fn new(n_splits: usize, shuffle: bool, seed: u64) -> Result<Self> {
        if n_splits < 2 {
            return Err(Error::InvalidConfig(format!(
                "cross-validation needs at least 2 folds, got {n_splits}"
            )));
        }
        Ok(Self {
            n_splits,
            shuffle,
            seed,
        })
    }

    /// Number of folds
    #[must_use]
    pub const fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Partition rows into folds.
    ///
    /// # Errors
    ///
    /// Returns `EmptyFold` if a class has fewer members than folds, since some
    /// fold would then hold no example of that class.
    pub fn split(&self, labels: &[u8]) -> Result<Vec<Fold>> {
        let mut test_sets: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        for class in [0u8, 1u8] {
            let mut members: Vec<usize> = labels
                .iter()
                .enumerate()
                .filter(|(_, &l)| l == class)
                .map(|(i, _)| i)
                .collect();

            if members.len() < self.n_splits {
                return Err(Error::EmptyFold {
                    fold: members.len(),
                    class,
                });
            }
            if self.shuffle {
                members.shuffle(&mut rng);
            }

            let base = members.len() / self.n_splits;
            let extra = members.len() % self.n_splits;
            let mut start = 0;
            for (fold, test) in test_sets.iter_mut().enumerate() {
                let size = base + usize::from(fold < extra);
                test.extend_from_slice(&members[start..start + size]);
                start += size;
            }
        }

        let folds = test_sets
            .into_iter()
            .enumerate()
            .map(|(index, mut test)| {
                test.sort_unstable();
                let train = (0..labels.len())
                    .filter(|i| test.binary_search(i).is_err())
                    .collect();
                Fold { index, train, test }
            })
            .collect();
        Ok(folds)
    }
}

/// Stratified train/test split holding out `test_fraction` of each class.
///
/// Each class is shuffled with a seeded RNG; the first
/// `round(n_class * test_fraction)` members (at least one) go to the test side.
///
/// # Errors
///
/// - `InvalidConfig` if `test_fraction` is not inside `(0, 1)`
/// - `EmptyFold` if a class cannot place a row on both sides
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn train_test_split(labels: &[u8], test_fraction: f64, seed: u64) -> Result<Fold> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(Error::InvalidConfig(format!(
            "test fraction must be in (0, 1), got {test_fraction}"
        )));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut test = Vec::new();

    for class in [0u8, 1u8] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();
        let n_test = ((members.len() as f64 * test_fraction).round() as usize).max(1);
        if n_test >= members.len() {
            return Err(Error::EmptyFold {
                fold: members.len(),
                class,
            });
        }
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..n_test]);
    }

    test.sort_unstable();
    let train = (0..labels.len())
        .filter(|i| test.binary_search(i).is_err())
        .collect();
    Ok(Fold {
        index: 0,
        train,
        test,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(neg: usize, pos: usize) -> Vec<u8> {
        let mut y = vec![0u8; neg];
        y.extend(vec![1u8; pos]);
        y
    }

    #[test]
    fn test_folds_partition_rows() {
        let y = labels(40, 10);
        let folds = StratifiedKFold::new(5, true, 42).unwrap().split(&y).unwrap();
        assert_eq!(folds.len(), 5);

        let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test.clone()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..50).collect::<Vec<_>>());

        for fold in &folds {
            assert_eq!(fold.train.len() + fold.test.len(), 50);
            let pos = fold.test.iter().filter(|&&i| y[i] == 1).count();
            assert_eq!(pos, 2);
        }
    }

    #[test]
    fn test_seed_reproducible() {
        let y = labels(30, 12);
        let a = StratifiedKFold::new(3, true, 7).unwrap().split(&y).unwrap();
        let b = StratifiedKFold::new(3, true, 7).unwrap().split(&y).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_too_few_minority_is_empty_fold() {
        let y = labels(20, 3);
        let err = StratifiedKFold::new(5, true, 42).unwrap().split(&y).unwrap_err();
        assert!(matches!(err, Error::EmptyFold { class: 1, .. }));
    }

    #[test]
    fn test_needs_two_splits() {
        assert!(StratifiedKFold::new(1, false, 0).is_err());
    }

    #[test]
    fn test_holdout_keeps_class_ratio() {
        let y = labels(80, 20);
        let split = train_test_split(&y, 0.2, 42).unwrap();
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        assert_eq!(split.test.iter().filter(|&&i| y[i] == 1).count(), 4);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
        assert_eq!(train_test_split(&y, 0.2, 42).unwrap(), split);
    }

    #[test]
    fn test_holdout_rejects_tiny_class_and_bad_fraction() {
        assert!(matches!(
            train_test_split(&labels(10, 1), 0.2, 1).unwrap_err(),
            Error::EmptyFold { class: 1, .. }
        ));
        assert!(train_test_split(&labels(10, 10), 0.0, 1).is_err());
        assert!(train_test_split(&labels(10, 10), 1.0, 1).is_err());
    }
}
