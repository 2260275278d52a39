//! Sample tables (Arrow/Parquet)
//!
//! **Load-Once Design**:
//! - A table is materialized eagerly, before fitting begins
//! - Write pattern: whole batches appended with schema validation (no row updates)
//! - Row order is fixed at load; nothing in the crate reorders rows implicitly
//!
//! Numeric columns are read as `f64` regardless of their Arrow type, with nulls
//! surfacing as `NaN` so the imputer can see them.

use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::path::Path;
use std::sync::Arc;

/// One row per subject-condition, named columns
#[derive(Debug, Clone)]
pub struct SampleTable {
    batches: Vec<RecordBatch>,
}

impl SampleTable {
    /// Create a table from existing batches
    ///
    /// # Errors
    /// Returns error if the batches do not share one schema
    pub fn new(batches: Vec<RecordBatch>) -> Result<Self> {
        let mut table = Self { batches: Vec::with_capacity(batches.len()) };
        for batch in batches {
            table.append_batch(batch)?;
        }
        Ok(table)
    }

    /// Start building an in-memory table column by column
    #[must_use]
    pub fn builder() -> TableBuilder {
        TableBuilder::default()
    }

    /// Load table from Parquet file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::fs::File;

        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Error::StorageError(format!("Failed to open Parquet file {}: {e}", path.display()))
        })?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| {
            Error::StorageError(format!("Failed to parse Parquet file {}: {e}", path.display()))
        })?;

        let reader = builder.build().map_err(|e| {
            Error::StorageError(format!("Failed to create Parquet reader: {e}"))
        })?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch.map_err(|e| {
                Error::StorageError(format!("Failed to read record batch: {e}"))
            })?;
            batches.push(batch);
        }

        tracing::info!(path = %path.display(), batches = batches.len(), "Loaded sample table");
        Self::new(batches)
    }

    /// Get all record batches
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Append a batch (the only supported write)
    ///
    /// # Errors
    ///
    /// Returns error if batch schema doesn't match existing batches
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if let Some(first) = self.batches.first() {
            let existing_schema = first.schema();
            if batch.schema() != existing_schema {
                return Err(Error::StorageError(format!(
                    "Schema mismatch: expected {:?}, got {:?}",
                    existing_schema,
                    batch.schema()
                )));
            }
        }

        self.batches.push(batch);
        Ok(())
    }

    /// Total row count across batches
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Column names in schema order
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.batches.first().map_or_else(Vec::new, |b| {
            b.schema().fields().iter().map(|f| f.name().clone()).collect()
        })
    }

    /// Whether the table has a column with this name
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.batches
            .first()
            .is_some_and(|b| b.schema().index_of(name).is_ok())
    }

    /// Read a numeric column as `f64`, nulls as `NaN`
    ///
    /// # Errors
    /// Returns error if the column is absent or cannot be cast to `Float64`
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>> {
        let mut values = Vec::with_capacity(self.num_rows());
        for column in self.columns(name)? {
            let casted = cast(&column, &DataType::Float64)?;
            let array = casted
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| Error::StorageError(format!("Column '{name}' is not numeric")))?;
            values.extend((0..array.len()).map(|i| {
                if array.is_null(i) {
                    f64::NAN
                } else {
                    array.value(i)
                }
            }));
        }
        Ok(values)
    }

    /// Read a categorical column as strings
    ///
    /// # Errors
    /// Returns error if the column is absent, not castable to text, or has nulls
    pub fn string_column(&self, name: &str) -> Result<Vec<String>> {
        let mut values = Vec::with_capacity(self.num_rows());
        for column in self.columns(name)? {
            let casted = cast(&column, &DataType::Utf8)?;
            let array = casted
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::StorageError(format!("Column '{name}' is not text")))?;
            for i in 0..array.len() {
                if array.is_null(i) {
                    return Err(Error::StorageError(format!(
                        "Column '{name}' has a null at row {}",
                        values.len()
                    )));
                }
                values.push(array.value(i).to_string());
            }
        }
        Ok(values)
    }

    fn columns(&self, name: &str) -> Result<Vec<ArrayRef>> {
        if !self.has_column(name) {
            return Err(Error::MissingColumn(name.to_string()));
        }
        self.batches
            .iter()
            .map(|b| {
                let idx = b.schema().index_of(name)?;
                Ok(Arc::clone(b.column(idx)))
            })
            .collect()
    }
}

/// Column-wise builder for in-memory tables
#[derive(Debug, Default)]
pub struct TableBuilder {
    fields: Vec<Field>,
    columns: Vec<ArrayRef>,
}

impl TableBuilder {
    /// Add a numeric column; `NaN` entries become nulls
    #[must_use]
    pub fn numeric(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        let array: Float64Array = values
            .into_iter()
            .map(|v| if v.is_nan() { None } else { Some(v) })
            .collect();
        self.fields.push(Field::new(name.into(), DataType::Float64, true));
        self.columns.push(Arc::new(array));
        self
    }

    /// Add a text column
    #[must_use]
    pub fn categorical<S: AsRef<str>>(mut self, name: impl Into<String>, values: &[S]) -> Self {
        let array = StringArray::from_iter_values(values.iter().map(AsRef::as_ref));
        self.fields.push(Field::new(name.into(), DataType::Utf8, false));
        self.columns.push(Arc::new(array));
        self
    }

    /// Build a single-batch table
    ///
    /// # Errors
    /// Returns error if columns differ in length or names repeat
    pub fn build(self) -> Result<SampleTable> {
        let batch = RecordBatch::try_new(Arc::new(Schema::new(self.fields)), self.columns)?;
        SampleTable::new(vec![batch])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Int32Array;

    fn create_test_table() -> SampleTable {
        SampleTable::builder()
            .numeric("vel", vec![1.0, f64::NAN, 3.0])
            .categorical("subject", &["s1", "s2", "s3"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_numeric_column_nulls_become_nan() {
        let table = create_test_table();
        let vel = table.numeric_column("vel").unwrap();
        assert_eq!(vel.len(), 3);
        assert!((vel[0] - 1.0).abs() < f64::EPSILON);
        assert!(vel[1].is_nan());
    }

    #[test]
    fn test_integer_column_is_cast() {
        let schema = Arc::new(Schema::new(vec![Field::new("n", DataType::Int32, false)]));
        let batch =
            RecordBatch::try_new(schema, vec![Arc::new(Int32Array::from(vec![4, 5]))]).unwrap();
        let table = SampleTable::new(vec![batch]).unwrap();
        assert_eq!(table.numeric_column("n").unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_missing_column_named_in_error() {
        let table = create_test_table();
        let err = table.numeric_column("acc").unwrap_err();
        assert!(err.to_string().contains("acc"));
    }

    #[test]
    fn test_string_column() {
        let table = create_test_table();
        assert_eq!(table.string_column("subject").unwrap(), vec!["s1", "s2", "s3"]);
        assert!(table.has_column("subject"));
        assert_eq!(table.column_names(), vec!["vel", "subject"]);
    }

    #[test]
    fn test_append_batch_schema_validation() {
        let mut table = create_test_table();
        let incompatible = SampleTable::builder()
            .numeric("different_field", vec![1.0])
            .build()
            .unwrap();
        let result = table.append_batch(incompatible.batches()[0].clone());
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Schema mismatch"));
    }

    #[test]
    fn test_multiple_batches_preserve_rows() {
        let a = create_test_table();
        let mut table = a.clone();
        table.append_batch(a.batches()[0].clone()).unwrap();
        assert_eq!(table.num_rows(), 6);
        assert_eq!(table.numeric_column("vel").unwrap().len(), 6);
    }
}
