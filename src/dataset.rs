//! Dense feature matrix, label vector and the frozen column schema

use crate::{Error, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Ordered feature names.
///
/// Frozen at assembly time and stored in every artifact; a scoring request
/// must carry exactly these fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Create a schema from ordered names
    ///
    /// # Errors
    /// Returns error if a name repeats
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Result<Self> {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::InvalidInput(format!("duplicate feature name '{name}'")));
            }
        }
        Ok(Self { names })
    }

    /// Feature names in column order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of columns
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the schema has no columns
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Column index of a feature
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Keep only the columns where `mask` is true
    #[must_use]
    pub fn masked(&self, mask: &[bool]) -> Vec<String> {
        self.names
            .iter()
            .zip(mask)
            .filter(|(_, &keep)| keep)
            .map(|(n, _)| n.clone())
            .collect()
    }
}

/// Feature matrix with aligned binary labels
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array1<u8>,
    schema: FeatureSchema,
}

impl Dataset {
    /// Create a dataset, validating shapes and label values
    ///
    /// # Errors
    /// Returns error if row counts, column counts or label values disagree
    pub fn new(x: Array2<f64>, y: Array1<u8>, schema: FeatureSchema) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(Error::ShapeMismatch {
                stage: "dataset labels".to_string(),
                expected: x.nrows(),
                found: y.len(),
            });
        }
        if x.ncols() != schema.len() {
            return Err(Error::ShapeMismatch {
                stage: "dataset schema".to_string(),
                expected: schema.len(),
                found: x.ncols(),
            });
        }
        if let Some(bad) = y.iter().find(|&&l| l > 1) {
            return Err(Error::InvalidInput(format!("label {bad} is not binary")));
        }
        Ok(Self { x, y, schema })
    }

    /// Feature matrix
    #[must_use]
    pub const fn features(&self) -> &Array2<f64> {
        &self.x
    }

    /// Label vector
    #[must_use]
    pub const fn labels(&self) -> &Array1<u8> {
        &self.y
    }

    /// Column schema
    #[must_use]
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Row count
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.x.nrows()
    }

    /// Column count
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    /// `[negatives, positives]`
    #[must_use]
    pub fn class_counts(&self) -> [usize; 2] {
        class_counts(self.y.as_slice().unwrap_or(&[]))
    }

    /// Number of `NaN` cells
    #[must_use]
    pub fn missing_count(&self) -> usize {
        self.x.iter().filter(|v| v.is_nan()).count()
    }

    /// Copy of the given rows, in the given order
    #[must_use]
    pub fn subset(&self, rows: &[usize]) -> Self {
        Self {
            x: self.x.select(Axis(0), rows),
            y: self.y.select(Axis(0), rows),
            schema: self.schema.clone(),
        }
    }

    /// Split into owned parts
    #[must_use]
    pub fn into_parts(self) -> (Array2<f64>, Array1<u8>, FeatureSchema) {
        (self.x, self.y, self.schema)
    }
}

/// Count `[negatives, positives]` in a label slice
#[must_use]
pub fn class_counts(labels: &[u8]) -> [usize; 2] {
    let positives = labels.iter().filter(|&&l| l == 1).count();
    [labels.len() - positives, positives]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn schema(n: usize) -> FeatureSchema {
        FeatureSchema::new((0..n).map(|i| format!("f{i}"))).unwrap()
    }

    #[test]
    fn test_schema_rejects_duplicates() {
        assert!(FeatureSchema::new(["a", "b", "a"]).is_err());
    }

    #[test]
    fn test_schema_masked() {
        let s = schema(3);
        assert_eq!(s.masked(&[true, false, true]), vec!["f0", "f2"]);
        assert_eq!(s.index_of("f1"), Some(1));
    }

    #[test]
    fn test_dataset_shape_validation() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(Dataset::new(x.clone(), array![0, 1, 1], schema(2)).is_err());
        assert!(Dataset::new(x.clone(), array![0, 1], schema(3)).is_err());
        assert!(Dataset::new(x.clone(), array![0, 2], schema(2)).is_err());
        assert!(Dataset::new(x, array![0, 1], schema(2)).is_ok());
    }

    #[test]
    fn test_subset_and_counts() {
        let x = array![[1.0, f64::NAN], [3.0, 4.0], [5.0, 6.0]];
        let ds = Dataset::new(x, array![0, 1, 1], schema(2)).unwrap();
        assert_eq!(ds.class_counts(), [1, 2]);
        assert_eq!(ds.missing_count(), 1);

        let sub = ds.subset(&[2, 0]);
        assert_eq!(sub.labels(), &array![1, 0]);
        assert!((sub.features()[[0, 0]] - 5.0).abs() < f64::EPSILON);
    }
}
