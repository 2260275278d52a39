//! Training configuration
//!
//! Every tunable of a run lives here and is validated once, at construction.
//! Missing JSON fields take the defaults below.

use crate::balance::DEFAULT_K_NEIGHBORS;
use crate::features::{JoinStrategy, DEFAULT_CONDITION_PREFIX};
use crate::preprocess::ImputeStrategy;
use crate::search::ParamGrid;
use crate::selection::FeatureSelector;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Kinematic features from the mouse-tracking variant of the task
pub const MOUSE_TRACKING_FEATURES: [&str; 14] = [
    "vel_max_nogo10coh",
    "acc_max_nogo10coh",
    "total_dist_nogo10coh",
    "vel_max_nogo50coh",
    "acc_max_nogo50coh",
    "total_dist_nogo50coh",
    "vel_max_nogo80coh",
    "acc_max_nogo80coh",
    "total_dist_nogo80coh",
    "ssrt_integ",
    "IN",
    "vol",
    "go_acc",
    "meanmt",
];

/// Response-time features from the key-press variant of the task
pub const RESPONSE_TIME_FEATURES: [&str; 10] = [
    "meanRT_go",
    "sdRT_go",
    "meanRT_stop",
    "sdRT_nogo",
    "dda",
    "stop_accuracy",
    "ssrt_integ",
    "ssrt0.1",
    "ssrt0.5",
    "ssrt0.8",
];

/// Configuration of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Name recorded on runs and artifacts
    pub model_name: String,
    /// Column holding the continuous severity measure
    pub severity_column: String,
    /// Quantile fraction for the positive-label threshold
    pub label_quantile: f64,
    /// Ordered features the model consumes
    pub required_features: Vec<String>,
    /// How tables of one condition are merged
    pub join: JoinStrategy,
    /// Prefix of condition dummy columns
    pub condition_prefix: String,
    /// Fill strategy for missing cells
    pub impute: ImputeStrategy,
    /// Oversample the minority class before the search
    pub balance: bool,
    /// SMOTE neighborhood size
    pub k_neighbors: usize,
    /// Run recursive feature elimination inside the pipeline
    pub select_features: bool,
    /// Feature floor for elimination
    pub min_features: usize,
    /// Inner folds used by elimination
    pub selection_folds: usize,
    /// Folds of the hyperparameter search
    pub cv_folds: usize,
    /// Run nested cross-validation for an unbiased estimate
    pub nested: bool,
    /// Outer folds of nested cross-validation
    pub outer_folds: usize,
    /// Fraction of observed rows kept out of the search for a final
    /// evaluation; `0.0` disables the held-out split
    pub holdout_fraction: f64,
    /// Hyperparameter grid
    pub grid: ParamGrid,
    /// Seed for every shuffle and sampler in the run
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            model_name: "risk-logreg".to_string(),
            severity_column: "H".to_string(),
            label_quantile: 0.8,
            required_features: MOUSE_TRACKING_FEATURES.iter().map(ToString::to_string).collect(),
            join: JoinStrategy::default(),
            condition_prefix: DEFAULT_CONDITION_PREFIX.to_string(),
            impute: ImputeStrategy::Median,
            balance: true,
            k_neighbors: DEFAULT_K_NEIGHBORS,
            select_features: true,
            min_features: 5,
            selection_folds: 5,
            cv_folds: 5,
            nested: true,
            outer_folds: 5,
            holdout_fraction: 0.0,
            grid: ParamGrid::logistic_default(),
            seed: 42,
        }
    }
}

impl TrainingConfig {
    /// Start from the defaults
    #[must_use]
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    /// Parse and validate a JSON document
    ///
    /// # Errors
    /// Returns `Json` on malformed input and `InvalidConfig` on bad values
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be read, otherwise as [`Self::from_json`]
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Check every value is usable
    ///
    /// # Errors
    /// Returns `InvalidConfig` naming the first offending setting
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::InvalidConfig(msg));

        if !(self.label_quantile > 0.0 && self.label_quantile < 1.0) {
            return invalid(format!(
                "label_quantile must be in (0, 1), got {}",
                self.label_quantile
            ));
        }
        if self.severity_column.is_empty() {
            return invalid("severity_column must not be empty".to_string());
        }
        if self.required_features.is_empty() {
            return invalid("required_features must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.required_features.iter().find(|f| !seen.insert(f.as_str())) {
            return invalid(format!("required feature '{dup}' listed twice"));
        }
        if self.required_features.contains(&self.severity_column) {
            return invalid(format!(
                "severity column '{}' cannot also be a feature",
                self.severity_column
            ));
        }
        if let JoinStrategy::Position {
            assert_aligned: false,
        } = self.join
        {
            return invalid("positional join requires assert_aligned: true".to_string());
        }
        for (name, folds) in [
            ("cv_folds", self.cv_folds),
            ("outer_folds", self.outer_folds),
            ("selection_folds", self.selection_folds),
        ] {
            if folds < 2 {
                return invalid(format!("{name} must be at least 2, got {folds}"));
            }
        }
        if !(0.0..1.0).contains(&self.holdout_fraction) {
            return invalid(format!(
                "holdout_fraction must be in [0, 1), got {}",
                self.holdout_fraction
            ));
        }
        if self.balance && self.k_neighbors == 0 {
            return invalid("k_neighbors must be at least 1".to_string());
        }
        if self.select_features && self.min_features == 0 {
            return invalid("min_features must be at least 1".to_string());
        }
        if self.grid.is_empty() {
            return invalid("grid has no candidates".to_string());
        }
        for candidate in self.grid.candidates() {
            candidate.validate()?;
        }
        Ok(())
    }

    /// Feature selector settings, or `None` when elimination is off
    #[must_use]
    pub const fn feature_selector(&self) -> Option<FeatureSelector> {
        if self.select_features {
            Some(FeatureSelector {
                min_features: self.min_features,
                cv_folds: self.selection_folds,
                ranking_c: 1.0,
                seed: self.seed,
            })
        } else {
            None
        }
    }
}

/// Builder for [`TrainingConfig`]
#[derive(Debug, Default)]
pub struct TrainingConfigBuilder {
    config: TrainingConfig,
}

impl TrainingConfigBuilder {
    /// Model name
    #[must_use]
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.config.model_name = name.into();
        self
    }

    /// Severity column
    #[must_use]
    pub fn severity_column(mut self, column: impl Into<String>) -> Self {
        self.config.severity_column = column.into();
        self
    }

    /// Label quantile
    #[must_use]
    pub const fn label_quantile(mut self, q: f64) -> Self {
        self.config.label_quantile = q;
        self
    }

    /// Ordered required features
    #[must_use]
    pub fn required_features<S: Into<String>>(mut self, features: impl IntoIterator<Item = S>) -> Self {
        self.config.required_features = features.into_iter().map(Into::into).collect();
        self
    }

    /// Join strategy
    #[must_use]
    pub fn join(mut self, join: JoinStrategy) -> Self {
        self.config.join = join;
        self
    }

    /// Condition dummy prefix
    #[must_use]
    pub fn condition_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.condition_prefix = prefix.into();
        self
    }

    /// Imputation strategy
    #[must_use]
    pub const fn impute(mut self, strategy: ImputeStrategy) -> Self {
        self.config.impute = strategy;
        self
    }

    /// Toggle oversampling and set its neighborhood size
    #[must_use]
    pub const fn balance(mut self, enabled: bool, k_neighbors: usize) -> Self {
        self.config.balance = enabled;
        self.config.k_neighbors = k_neighbors;
        self
    }

    /// Toggle feature elimination and set its floor
    #[must_use]
    pub const fn select_features(mut self, enabled: bool, min_features: usize) -> Self {
        self.config.select_features = enabled;
        self.config.min_features = min_features;
        self
    }

    /// Fold counts for search, nested outer loop and elimination
    #[must_use]
    pub const fn folds(mut self, cv: usize, outer: usize, selection: usize) -> Self {
        self.config.cv_folds = cv;
        self.config.outer_folds = outer;
        self.config.selection_folds = selection;
        self
    }

    /// Toggle nested evaluation
    #[must_use]
    pub const fn nested(mut self, enabled: bool) -> Self {
        self.config.nested = enabled;
        self
    }

    /// Held-out fraction for the final evaluation (`0.0` turns it off)
    #[must_use]
    pub const fn holdout(mut self, fraction: f64) -> Self {
        self.config.holdout_fraction = fraction;
        self
    }

    /// Hyperparameter grid
    #[must_use]
    pub fn grid(mut self, grid: ParamGrid) -> Self {
        self.config.grid = grid;
        self
    }

    /// Run seed
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Validate and build
    ///
    /// # Errors
    /// Returns `InvalidConfig` as [`TrainingConfig::validate`]
    pub fn build(self) -> Result<TrainingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
