//! Training orchestration
//!
//! One call wires the stages together for a run:
//! assemble → label → (held-out split) → (impute + oversample) → grid search →
//! nested evaluation → held-out evaluation.
//! Every run, successful or failed, lands in the trainer's [`TrainingStore`]
//! together with its candidate scores.

use crate::balance::SmoteBalancer;
use crate::config::TrainingConfig;
use crate::cv::{train_test_split, StratifiedKFold};
use crate::dataset::{Dataset, FeatureSchema};
use crate::features::{ConditionSource, FeatureAssembler};
use crate::labels::{derive_labels, LabelSummary};
use crate::metrics::HoldoutReport;
use crate::persist::{ArtifactSummary, ModelArtifact};
use crate::pipeline::PipelineSpec;
use crate::preprocess::Imputer;
use crate::search::{GridSearch, NestedCrossValidation, NestedResult, ScorePopulation, SearchResult};
use crate::tracking::{
    MetricRecord, RunRecord, RunStatus, TrainingStore, CV_AUC, HOLDOUT_AUC, NESTED_AUC,
};
use crate::Result;
use ndarray::Array1;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

/// Ledger shared by a trainer, its clones and the outcomes it produces
type Ledger = Arc<RwLock<TrainingStore>>;

fn record_into(ledger: &Ledger, update: impl FnOnce(&mut TrainingStore)) {
    update(&mut ledger.write().unwrap_or_else(PoisonError::into_inner));
}

fn snapshot(ledger: &Ledger) -> TrainingStore {
    ledger.read().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Dataset ready for the search, plus how it was built
#[derive(Debug, Clone)]
pub struct PreparedData {
    /// Rows the search runs on (balanced when oversampling is on)
    pub dataset: Dataset,
    /// Observed rows kept out of the search, when a held-out split is configured
    pub holdout: Option<Dataset>,
    /// Label derivation outcome on the observed rows
    pub labels: LabelSummary,
    /// Population the dataset represents
    pub population: ScorePopulation,
    /// Class counts of the search rows before oversampling, `[negatives, positives]`
    pub observed_counts: [usize; 2],
}

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Grid search result, including the refit pipeline
    pub search: SearchResult,
    /// Nested evaluation, when enabled
    pub nested: Option<NestedResult>,
    /// Refit pipeline scored on the held-out rows, when a split was configured
    pub holdout: Option<HoldoutReport>,
    /// Label derivation outcome
    pub labels: LabelSummary,
    /// Frozen input schema
    pub schema: FeatureSchema,
    /// Rows the final pipeline was fit on
    pub training_rows: usize,
    /// Run record
    pub run: RunRecord,
    model_name: String,
    condition_columns: Vec<String>,
    ledger: Ledger,
}

impl TrainingOutcome {
    /// Package the refit pipeline as a persistable artifact
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if pipeline and schema disagree
    pub fn artifact(&self) -> Result<ModelArtifact> {
        let summary = ArtifactSummary {
            model_name: self.model_name.clone(),
            best_params: self.search.best_params.clone(),
            best_score: self.search.best_score,
            population: self.search.population,
            nested_mean: self.nested.as_ref().map(|n| n.mean),
            nested_std: self.nested.as_ref().map(|n| n.std),
            label_quantile: self.labels.quantile,
            label_threshold: self.labels.threshold,
            training_rows: self.training_rows,
            holdout_auc: self.holdout.as_ref().map(|h| h.auc),
            condition_columns: self.condition_columns.clone(),
        };
        ModelArtifact::new(&self.schema, self.search.pipeline.clone(), summary)
    }

    /// Build the artifact, save it and record it in the ledger
    ///
    /// # Errors
    /// Returns persistence errors
    pub fn save_artifact<P: AsRef<std::path::Path>>(&self, path: P) -> Result<ModelArtifact> {
        let artifact = self.artifact()?;
        let record = artifact.save(path, self.run.run_id())?;
        record_into(&self.ledger, |store| store.add_artifact(record));
        Ok(artifact)
    }

    /// Snapshot of the ledger this run was recorded in
    #[must_use]
    pub fn store(&self) -> TrainingStore {
        snapshot(&self.ledger)
    }
}

struct Trained {
    search: SearchResult,
    nested: Option<NestedResult>,
    holdout: Option<HoldoutReport>,
    prepared: PreparedData,
}

/// Runs training jobs for one configuration
///
/// Clones share one ledger, so a clone moved onto a worker still records
/// into the store the original reads.
#[derive(Debug, Clone)]
pub struct Trainer {
    config: TrainingConfig,
    ledger: Ledger,
}

impl Trainer {
    /// Create a trainer with an empty ledger
    ///
    /// # Errors
    /// Returns `InvalidConfig` if the configuration does not validate
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ledger: Arc::new(RwLock::new(TrainingStore::new())),
        })
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Snapshot of every run, metric and artifact recorded so far
    #[must_use]
    pub fn store(&self) -> TrainingStore {
        snapshot(&self.ledger)
    }

    /// Assemble, label, split off held-out rows and (optionally) balance
    ///
    /// # Errors
    /// Propagates assembly, labeling, splitting, imputation and oversampling errors
    pub fn prepare(&self, sources: &[ConditionSource]) -> Result<PreparedData> {
        let config = &self.config;
        let assembled = FeatureAssembler::new(
            config.required_features.iter().cloned(),
            config.severity_column.clone(),
        )
        .join(config.join.clone())
        .condition_prefix(config.condition_prefix.clone())
        .assemble(sources)?;

        let (labels, summary) =
            derive_labels(&assembled.severity, config.label_quantile, &config.severity_column)?;
        let mut observed = Dataset::new(assembled.features, Array1::from(labels), assembled.schema)?;

        let holdout = if config.holdout_fraction > 0.0 {
            let split = train_test_split(
                &observed.labels().to_vec(),
                config.holdout_fraction,
                config.seed,
            )?;
            let held_out = observed.subset(&split.test);
            observed = observed.subset(&split.train);
            info!(
                search_rows = observed.n_rows(),
                holdout_rows = held_out.n_rows(),
                fraction = config.holdout_fraction,
                "Split off held-out rows"
            );
            Some(held_out)
        } else {
            None
        };
        let observed_counts = observed.class_counts();

        if !config.balance {
            return Ok(PreparedData {
                dataset: observed,
                holdout,
                labels: summary,
                population: ScorePopulation::Natural,
                observed_counts,
            });
        }

        // Oversampling interpolates between rows, so gaps are filled first
        let (x, y, schema) = observed.into_parts();
        let filled = Imputer::fit(&x, config.impute)?.transform(&x)?;
        let imputed = Dataset::new(filled, y, schema)?;
        let balanced = SmoteBalancer::new(config.k_neighbors, config.seed).balance(&imputed)?;
        info!(
            before = ?observed_counts,
            after = ?balanced.class_counts(),
            "Balanced classes"
        );

        Ok(PreparedData {
            dataset: balanced,
            holdout,
            labels: summary,
            population: ScorePopulation::Balanced,
            observed_counts,
        })
    }

    /// Run the whole training job
    ///
    /// The run record enters the ledger as running and is replaced by its
    /// final state, so failed runs stay inspectable through [`Self::store`].
    ///
    /// # Errors
    /// Returns the first stage error; the run is recorded as failed
    pub fn run(&self, sources: &[ConditionSource]) -> Result<TrainingOutcome> {
        let config = &self.config;
        let run_id = format!("{}-{}", config.model_name, chrono::Utc::now().format("%Y%m%dT%H%M%S%.3f"));
        let mut run = RunRecord::builder(&run_id, &config.model_name)
            .config(serde_json::to_value(config)?)
            .build();
        run.start();
        record_into(&self.ledger, |store| store.add_run(run.clone()));
        info!(run = %run_id, sources = sources.len(), "Training run started");

        match self.execute(sources, &run_id) {
            Ok(trained) => {
                run.complete(RunStatus::Success);
                record_into(&self.ledger, |store| store.add_run(run.clone()));
                info!(
                    run = %run_id,
                    best = %trained.search.best_params,
                    cv_auc = trained.search.best_score,
                    nested_auc = trained.nested.as_ref().map(|n| n.mean),
                    holdout_auc = trained.holdout.as_ref().map(|h| h.auc),
                    "Training run finished"
                );
                let schema = trained.prepared.dataset.schema().clone();
                let condition_columns = schema
                    .names()
                    .iter()
                    .filter(|&name| !config.required_features.contains(name))
                    .cloned()
                    .collect();
                Ok(TrainingOutcome {
                    training_rows: trained.prepared.dataset.n_rows(),
                    schema,
                    labels: trained.prepared.labels,
                    search: trained.search,
                    nested: trained.nested,
                    holdout: trained.holdout,
                    run,
                    model_name: config.model_name.clone(),
                    condition_columns,
                    ledger: Arc::clone(&self.ledger),
                })
            }
            Err(e) => {
                run.fail(e.to_string());
                record_into(&self.ledger, |store| store.add_run(run.clone()));
                warn!(run = %run_id, error = %e, "Training run failed");
                Err(e)
            }
        }
    }

    fn execute(&self, sources: &[ConditionSource], run_id: &str) -> Result<Trained> {
        let config = &self.config;
        let prepared = self.prepare(sources)?;

        let spec = PipelineSpec {
            impute: config.impute,
            selection: config.feature_selector(),
        };
        let search = GridSearch::new(
            config.grid.clone(),
            spec,
            StratifiedKFold::new(config.cv_folds, true, config.seed)?,
        )
        .population(prepared.population);

        let nested = if config.nested {
            let outer = StratifiedKFold::new(config.outer_folds, true, config.seed)?;
            Some(NestedCrossValidation::new(outer, search.clone()).evaluate(&prepared.dataset)?)
        } else {
            None
        };
        let result = search.fit(&prepared.dataset)?;

        let holdout = match &prepared.holdout {
            Some(rows) => {
                let proba = result.pipeline.predict_proba(rows.features())?;
                let report = HoldoutReport::evaluate(&rows.labels().to_vec(), &proba.to_vec())?;
                info!(
                    rows = report.rows,
                    auc = report.auc,
                    precision = report.precision,
                    recall = report.recall,
                    f1 = report.f1,
                    "Held-out evaluation"
                );
                Some(report)
            }
            None => None,
        };

        let mut metrics: Vec<MetricRecord> = result
            .candidates
            .iter()
            .enumerate()
            .map(|(step, candidate)| {
                MetricRecord::builder(run_id, CV_AUC, step as u64, candidate.mean)
                    .label(candidate.params.to_string())
                    .build()
            })
            .collect();
        if let Some(nested) = &nested {
            for (fold, (score, params)) in nested.fold_scores.iter().zip(&nested.chosen_params).enumerate() {
                metrics.push(
                    MetricRecord::builder(run_id, NESTED_AUC, fold as u64, *score)
                        .label(params.to_string())
                        .build(),
                );
            }
        }
        if let Some(report) = &holdout {
            metrics.push(
                MetricRecord::builder(run_id, HOLDOUT_AUC, 0, report.auc)
                    .label(result.best_params.to_string())
                    .build(),
            );
        }
        record_into(&self.ledger, |store| {
            for metric in metrics {
                store.add_metric(metric);
            }
        });

        Ok(Trained {
            search: result,
            nested,
            holdout,
            prepared,
        })
    }

    /// Run the job on tokio's blocking pool
    ///
    /// # Errors
    /// Returns the job's error, or `Other` if the task panicked
    #[cfg(feature = "tokio")]
    pub async fn run_blocking_task(self, sources: Vec<ConditionSource>) -> Result<TrainingOutcome> {
        tokio::task::spawn_blocking(move || self.run(&sources))
            .await
            .map_err(|e| crate::Error::Other(format!("training task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ParamGrid;
    use crate::storage::SampleTable;
    use crate::Error;

    #[allow(clippy::cast_precision_loss)]
    fn source(level: &str, n: usize, offset: usize) -> ConditionSource {
        let ids: Vec<String> = (0..n).map(|i| format!("s{}", i + offset)).collect();
        let severity: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let signal: Vec<f64> = (0..n).map(|i| (i as f64) * 0.1 + ((i * 7) % 5) as f64).collect();
        let noise: Vec<f64> = (0..n).map(|i| ((i * 13) % 11) as f64).collect();
        let table = SampleTable::builder()
            .categorical("subject_id", &ids)
            .numeric("H", severity)
            .numeric("f1", signal)
            .numeric("f2", noise)
            .build()
            .unwrap();
        ConditionSource::new(level, table)
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig::builder()
            .required_features(["f1", "f2"])
            .select_features(false, 1)
            .folds(3, 3, 3)
            .grid(ParamGrid::Logistic {
                c: vec![0.1, 1.0],
                max_iter: 100,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_prepare_balances_after_imputation() {
        let trainer = Trainer::new(small_config()).unwrap();
        let prepared = trainer.prepare(&[source("preset_SSD", 40, 0)]).unwrap();
        assert_eq!(prepared.observed_counts, [32, 8]);
        assert_eq!(prepared.dataset.class_counts(), [32, 32]);
        assert_eq!(prepared.dataset.missing_count(), 0);
        assert_eq!(prepared.population, ScorePopulation::Balanced);
    }

    #[test]
    fn test_run_records_every_candidate() {
        let trainer = Trainer::new(small_config()).unwrap();
        let outcome = trainer
            .run(&[source("preset_SSD", 30, 0), source("staircase_SSD", 30, 100)])
            .unwrap();

        let run_id = outcome.run.run_id().to_string();
        assert_eq!(outcome.run.status(), RunStatus::Success);
        let store = trainer.store();
        assert_eq!(store.metrics_for_run(&run_id, CV_AUC).len(), 2);
        assert_eq!(store.metrics_for_run(&run_id, NESTED_AUC).len(), 3);
        assert!(store.metrics_for_run(&run_id, HOLDOUT_AUC).is_empty());
        assert_eq!(store.get_run(&run_id).map(RunRecord::status), Some(RunStatus::Success));
        assert!(outcome.holdout.is_none());
        assert_eq!(
            outcome.schema.names(),
            &["f1", "f2", "experiment_staircase_SSD"]
        );
        let artifact = outcome.artifact().unwrap();
        assert_eq!(artifact.feature_names.len(), 3);
        assert_eq!(artifact.summary.population, ScorePopulation::Balanced);
        assert_eq!(artifact.summary.condition_columns, vec!["experiment_staircase_SSD"]);
    }

    #[test]
    fn test_run_surfaces_schema_mismatch() {
        let config = TrainingConfig::builder()
            .required_features(["f1", "absent"])
            .build()
            .unwrap();
        let trainer = Trainer::new(config).unwrap();
        let err = trainer.run(&[source("preset_SSD", 20, 0)]).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch { missing } if missing == vec!["absent"]));

        let store = trainer.store();
        assert_eq!(store.run_count(), 1);
        let run = store.runs().next().unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.failure().unwrap().contains("absent"));
        assert!(run.ended_at().is_some());
    }

    #[test]
    fn test_holdout_rows_stay_out_of_search() {
        let config = TrainingConfig::builder()
            .required_features(["f1", "f2"])
            .select_features(false, 1)
            .folds(3, 3, 3)
            .nested(false)
            .holdout(0.25)
            .grid(ParamGrid::Logistic {
                c: vec![0.1, 1.0],
                max_iter: 100,
            })
            .build()
            .unwrap();
        let trainer = Trainer::new(config).unwrap();
        let sources = [source("preset_SSD", 40, 0), source("staircase_SSD", 40, 100)];

        // 80 rows, 16 positive: 4 positives and 16 negatives held out
        let prepared = trainer.prepare(&sources).unwrap();
        let held_out = prepared.holdout.as_ref().unwrap();
        assert_eq!(held_out.n_rows(), 20);
        assert_eq!(held_out.class_counts(), [16, 4]);
        assert_eq!(prepared.observed_counts, [48, 12]);
        assert_eq!(prepared.dataset.class_counts(), [48, 48]);

        let outcome = trainer.run(&sources).unwrap();
        let report = outcome.holdout.as_ref().unwrap();
        assert_eq!(report.rows, 20);
        assert!((0.0..=1.0).contains(&report.auc));
        assert!((report.roc.area() - report.auc).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&report.f1));
        assert_eq!(outcome.training_rows, 96);

        let run_id = outcome.run.run_id().to_string();
        let recorded = outcome.store().metrics_for_run(&run_id, HOLDOUT_AUC);
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].value().to_bits(), report.auc.to_bits());
        assert_eq!(outcome.artifact().unwrap().summary.holdout_auc, Some(report.auc));
    }

    #[test]
    fn test_clones_share_one_ledger() {
        let trainer = Trainer::new(small_config()).unwrap();
        let worker = trainer.clone();
        worker.run(&[source("preset_SSD", 30, 0)]).unwrap();
        assert_eq!(trainer.store().run_count(), 1);
    }

    #[cfg(feature = "tokio")]
    #[tokio::test]
    async fn test_blocking_task_records_into_shared_ledger() {
        let trainer = Trainer::new(small_config()).unwrap();
        let view = trainer.clone();
        let outcome = trainer
            .run_blocking_task(vec![source("preset_SSD", 30, 0), source("staircase_SSD", 30, 100)])
            .await
            .unwrap();
        assert_eq!(outcome.run.status(), RunStatus::Success);
        assert_eq!(outcome.search.candidates.len(), 2);
        let store = view.store();
        assert_eq!(store.run_count(), 1);
        assert_eq!(store.metrics_for_run(outcome.run.run_id(), CV_AUC).len(), 2);
    }
}
