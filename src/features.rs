//! Feature assembly
//!
//! Turns per-condition sample tables into one feature matrix:
//! 1. Merge the tables of each condition (explicit key join or asserted positional join)
//! 2. Check every required feature is present somewhere
//! 3. Concatenate conditions in the order given
//! 4. One-hot encode the condition, dropping the first sorted level
//!
//! The resulting ordered name list is the scoring input contract.

use crate::dataset::FeatureSchema;
use crate::storage::SampleTable;
use crate::{Error, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Default prefix for condition dummy columns
pub const DEFAULT_CONDITION_PREFIX: &str = "experiment";

/// How tables describing the same subjects are aligned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStrategy {
    /// Join on a subject identifier column present in every table
    Key(String),
    /// Join by row position; only accepted with `assert_aligned: true`
    Position {
        /// Caller asserts row counts and subject ordering match
        assert_aligned: bool,
    },
}

impl Default for JoinStrategy {
    fn default() -> Self {
        Self::Key("subject_id".to_string())
    }
}

/// All tables recorded under one experiment condition
#[derive(Debug, Clone)]
pub struct ConditionSource {
    level: String,
    tables: Vec<SampleTable>,
}

impl ConditionSource {
    /// Condition with a single table
    #[must_use]
    pub fn new(level: impl Into<String>, table: SampleTable) -> Self {
        Self {
            level: level.into(),
            tables: vec![table],
        }
    }

    /// Add another table for the same subjects (e.g. keypress summaries)
    #[must_use]
    pub fn with_table(mut self, table: SampleTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Condition level name
    #[must_use]
    pub fn level(&self) -> &str {
        &self.level
    }

    /// Subject rows in this condition
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.tables.first().map_or(0, SampleTable::num_rows)
    }
}

/// Assembled features plus the raw severity column for labeling
#[derive(Debug, Clone)]
pub struct AssembledData {
    /// Feature matrix, `NaN` where a value is missing
    pub features: Array2<f64>,
    /// Frozen column schema
    pub schema: FeatureSchema,
    /// Severity measure per row (`NaN` when absent)
    pub severity: Vec<f64>,
    /// Condition level per row
    pub conditions: Vec<String>,
}

/// Builds the feature matrix from condition sources
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    required: Vec<String>,
    severity_column: String,
    condition_prefix: String,
    join: JoinStrategy,
}

impl FeatureAssembler {
    /// Create an assembler for the ordered required features
    #[must_use]
    pub fn new<S: Into<String>>(
        required: impl IntoIterator<Item = S>,
        severity_column: impl Into<String>,
    ) -> Self {
        Self {
            required: required.into_iter().map(Into::into).collect(),
            severity_column: severity_column.into(),
            condition_prefix: DEFAULT_CONDITION_PREFIX.to_string(),
            join: JoinStrategy::default(),
        }
    }

    /// Set the multi-table join strategy
    #[must_use]
    pub fn join(mut self, join: JoinStrategy) -> Self {
        self.join = join;
        self
    }

    /// Set the dummy column prefix
    #[must_use]
    pub fn condition_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.condition_prefix = prefix.into();
        self
    }

    /// Required features in order
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Names of required features absent from every source, in required order
    #[must_use]
    pub fn missing_features(&self, sources: &[ConditionSource]) -> Vec<String> {
        self.required
            .iter()
            .filter(|f| {
                !sources
                    .iter()
                    .any(|s| s.tables.iter().any(|t| t.has_column(f)))
            })
            .cloned()
            .collect()
    }

    /// Assemble sources into a feature matrix.
    ///
    /// A feature present in some conditions but not others is `NaN` for the
    /// rows of the conditions lacking it.
    ///
    /// # Errors
    ///
    /// - `SchemaMismatch` when a required feature is absent from every source
    /// - `MissingColumn` when the severity column is absent from every source
    /// - `JoinError` when a multi-table condition cannot be aligned
    pub fn assemble(&self, sources: &[ConditionSource]) -> Result<AssembledData> {
        if sources.is_empty() {
            return Err(Error::InvalidInput("no condition sources".to_string()));
        }

        let missing = self.missing_features(sources);
        if !missing.is_empty() {
            tracing::warn!(?missing, "Required features absent from input");
            return Err(Error::SchemaMismatch { missing });
        }
        if !sources
            .iter()
            .any(|s| s.tables.iter().any(|t| t.has_column(&self.severity_column)))
        {
            return Err(Error::MissingColumn(self.severity_column.clone()));
        }

        let merged: Vec<MergedCondition<'_>> = sources
            .iter()
            .map(|s| MergedCondition::merge(s, &self.join))
            .collect::<Result<_>>()?;

        let levels: BTreeSet<&str> = sources.iter().map(ConditionSource::level).collect();
        let dummy_levels: Vec<&str> = levels.into_iter().skip(1).collect();

        let mut names = self.required.clone();
        names.extend(
            dummy_levels
                .iter()
                .map(|level| format!("{}_{level}", self.condition_prefix)),
        );
        let schema = FeatureSchema::new(names)?;

        let total_rows: usize = merged.iter().map(|m| m.rows).sum();
        let mut features = Array2::<f64>::from_elem((total_rows, schema.len()), f64::NAN);
        let mut severity = Vec::with_capacity(total_rows);
        let mut conditions = Vec::with_capacity(total_rows);

        let mut offset = 0;
        for condition in &merged {
            for (col, name) in self.required.iter().enumerate() {
                if let Some(values) = condition.column(name)? {
                    for (row, v) in values.into_iter().enumerate() {
                        features[[offset + row, col]] = v;
                    }
                }
            }
            for (i, level) in dummy_levels.iter().enumerate() {
                let indicator = if *level == condition.level { 1.0 } else { 0.0 };
                let col = self.required.len() + i;
                for row in 0..condition.rows {
                    features[[offset + row, col]] = indicator;
                }
            }
            match condition.column(&self.severity_column)? {
                Some(values) => severity.extend(values),
                None => severity.extend(std::iter::repeat(f64::NAN).take(condition.rows)),
            }
            conditions.extend(std::iter::repeat(condition.level.to_string()).take(condition.rows));
            offset += condition.rows;
        }

        tracing::info!(
            rows = total_rows,
            columns = schema.len(),
            conditions = merged.len(),
            "Assembled feature matrix"
        );

        Ok(AssembledData {
            features,
            schema,
            severity,
            conditions,
        })
    }
}

/// Tables of one condition aligned onto the first table's rows
struct MergedCondition<'a> {
    level: &'a str,
    rows: usize,
    // (table, row mapping from base row to table row); None = identity
    tables: Vec<(&'a SampleTable, Option<Vec<usize>>)>,
}

impl<'a> MergedCondition<'a> {
    fn merge(source: &'a ConditionSource, join: &JoinStrategy) -> Result<Self> {
        let (base, rest) = source.tables.split_first().ok_or_else(|| {
            Error::JoinError(format!("condition '{}' has no tables", source.level))
        })?;
        let rows = base.num_rows();
        let mut tables = vec![(base, None)];

        for other in rest {
            let mapping = match join {
                JoinStrategy::Key(key) => Some(key_mapping(base, other, key, &source.level)?),
                JoinStrategy::Position { assert_aligned } => {
                    if !assert_aligned {
                        return Err(Error::JoinError(format!(
                            "condition '{}': positional join requires an explicit alignment assertion",
                            source.level
                        )));
                    }
                    if other.num_rows() != rows {
                        return Err(Error::JoinError(format!(
                            "condition '{}': positional join of {} rows onto {} rows",
                            source.level,
                            other.num_rows(),
                            rows
                        )));
                    }
                    tracing::warn!(
                        condition = %source.level,
                        rows,
                        "Joining tables by row position; subject ordering is assumed, not verified"
                    );
                    None
                }
            };
            tables.push((other, mapping));
        }

        Ok(Self {
            level: &source.level,
            rows,
            tables,
        })
    }

    /// First table carrying `name` wins; values reordered onto base rows
    fn column(&self, name: &str) -> Result<Option<Vec<f64>>> {
        for (table, mapping) in &self.tables {
            if table.has_column(name) {
                let values = table.numeric_column(name)?;
                return Ok(Some(match mapping {
                    Some(m) => m.iter().map(|&i| values[i]).collect(),
                    None => values,
                }));
            }
        }
        Ok(None)
    }
}

fn key_mapping(
    base: &SampleTable,
    other: &SampleTable,
    key: &str,
    level: &str,
) -> Result<Vec<usize>> {
    let base_keys = base.string_column(key)?;
    let other_keys = other.string_column(key)?;

    let mut index: HashMap<&str, usize> = HashMap::with_capacity(other_keys.len());
    for (i, k) in other_keys.iter().enumerate() {
        if index.insert(k.as_str(), i).is_some() {
            return Err(Error::JoinError(format!(
                "condition '{level}': duplicate key '{k}' in column '{key}'"
            )));
        }
    }

    base_keys
        .iter()
        .map(|k| {
            index.get(k.as_str()).copied().ok_or_else(|| {
                Error::JoinError(format!(
                    "condition '{level}': subject '{k}' has no match in joined table"
                ))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mouse(ids: &[&str], vel: Vec<f64>, h: Vec<f64>) -> SampleTable {
        SampleTable::builder()
            .categorical("subject_id", ids)
            .numeric("vel_max", vel)
            .numeric("H", h)
            .build()
            .unwrap()
    }

    fn keys(ids: &[&str], rt: Vec<f64>) -> SampleTable {
        SampleTable::builder()
            .categorical("subject_id", ids)
            .numeric("meanRT_go", rt)
            .build()
            .unwrap()
    }

    #[test]
    fn test_schema_and_dummy_encoding() {
        let sources = vec![
            ConditionSource::new("preset_SSD", mouse(&["a", "b"], vec![1.0, 2.0], vec![0.1, 0.2])),
            ConditionSource::new("staircase_SSD", mouse(&["c"], vec![3.0], vec![0.3])),
        ];
        let data = FeatureAssembler::new(["vel_max"], "H").assemble(&sources).unwrap();

        assert_eq!(
            data.schema.names(),
            &["vel_max".to_string(), "experiment_staircase_SSD".to_string()]
        );
        assert_eq!(data.features.column(1).to_vec(), vec![0.0, 0.0, 1.0]);
        assert_eq!(data.severity, vec![0.1, 0.2, 0.3]);
        assert_eq!(data.conditions[2], "staircase_SSD");
    }

    #[test]
    fn test_missing_features_reported_by_name() {
        let sources = vec![ConditionSource::new(
            "preset_SSD",
            mouse(&["a"], vec![1.0], vec![0.1]),
        )];
        let err = FeatureAssembler::new(["vel_max", "acc_max", "vol"], "H")
            .assemble(&sources)
            .unwrap_err();
        match err {
            Error::SchemaMismatch { missing } => assert_eq!(missing, vec!["acc_max", "vol"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_key_join_reorders_by_subject() {
        let source = ConditionSource::new(
            "preset_SSD",
            mouse(&["a", "b"], vec![1.0, 2.0], vec![0.1, 0.2]),
        )
        .with_table(keys(&["b", "a"], vec![20.0, 10.0]));

        let data = FeatureAssembler::new(["vel_max", "meanRT_go"], "H")
            .assemble(&[source])
            .unwrap();
        assert_eq!(data.features.column(1).to_vec(), vec![10.0, 20.0]);
    }

    #[test]
    fn test_key_join_unmatched_subject_fails() {
        let source = ConditionSource::new("p", mouse(&["a", "b"], vec![1.0, 2.0], vec![0.1, 0.2]))
            .with_table(keys(&["a", "z"], vec![1.0, 2.0]));
        let err = FeatureAssembler::new(["vel_max"], "H").assemble(&[source]).unwrap_err();
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_positional_join_requires_assertion() {
        let source = ConditionSource::new("p", mouse(&["a", "b"], vec![1.0, 2.0], vec![0.1, 0.2]))
            .with_table(keys(&["b", "a"], vec![20.0, 10.0]));

        let unasserted = FeatureAssembler::new(["vel_max", "meanRT_go"], "H")
            .join(JoinStrategy::Position { assert_aligned: false })
            .assemble(std::slice::from_ref(&source));
        assert!(matches!(unasserted, Err(Error::JoinError(_))));

        let asserted = FeatureAssembler::new(["vel_max", "meanRT_go"], "H")
            .join(JoinStrategy::Position { assert_aligned: true })
            .assemble(&[source])
            .unwrap();
        assert_eq!(asserted.features.column(1).to_vec(), vec![20.0, 10.0]);
    }

    #[test]
    fn test_feature_missing_in_one_condition_is_nan() {
        let with_rt = ConditionSource::new("a", mouse(&["x"], vec![1.0], vec![0.1]))
            .with_table(keys(&["x"], vec![5.0]));
        let without_rt = ConditionSource::new("b", mouse(&["y"], vec![2.0], vec![0.2]));
        let data = FeatureAssembler::new(["vel_max", "meanRT_go"], "H")
            .assemble(&[with_rt, without_rt])
            .unwrap();
        assert!((data.features[[0, 1]] - 5.0).abs() < f64::EPSILON);
        assert!(data.features[[1, 1]].is_nan());
    }

    #[test]
    fn test_column_order_is_stable() {
        let sources = vec![
            ConditionSource::new("z_level", mouse(&["a"], vec![1.0], vec![0.1])),
            ConditionSource::new("a_level", mouse(&["b"], vec![2.0], vec![0.2])),
        ];
        let assembler = FeatureAssembler::new(["vel_max"], "H");
        let first = assembler.assemble(&sources).unwrap();
        let second = assembler.assemble(&sources).unwrap();
        assert_eq!(first.schema, second.schema);
        assert_eq!(first.schema.names()[1], "experiment_z_level");
    }
}
