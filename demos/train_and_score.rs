//! Train-and-score walkthrough
//!
//! Builds two synthetic stop-signal conditions, trains the screening model,
//! saves the artifact and scores a record through the scoring service.
//!
//! Run with: cargo run --example train_and_score
//! Verbose:  RUST_LOG=drift_model=debug cargo run --example train_and_score

use anyhow::{Context, Result};
use drift_model::config::{TrainingConfig, MOUSE_TRACKING_FEATURES};
use drift_model::features::ConditionSource;
use drift_model::storage::SampleTable;
use drift_model::tracking::CV_AUC;
use drift_model::{ScoringService, Trainer};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Map};

#[allow(clippy::cast_precision_loss)]
fn synthetic_condition(level: &str, offset: usize, n: usize, seed: u64) -> Result<ConditionSource> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let ids: Vec<String> = (0..n).map(|i| format!("subject-{:03}", i + offset)).collect();
    let severity: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..30.0)).collect();

    let mut builder = SampleTable::builder()
        .categorical("subject_id", &ids)
        .numeric("H", severity.clone());
    for (j, name) in MOUSE_TRACKING_FEATURES.iter().enumerate() {
        let weight = 0.02 * (j % 4) as f64;
        let column: Vec<f64> = severity
            .iter()
            .map(|h| {
                if rng.gen_bool(0.03) {
                    f64::NAN
                } else {
                    h * weight + rng.gen_range(-1.0..1.0)
                }
            })
            .collect();
        builder = builder.numeric(*name, column);
    }

    let table = builder.build().context("building synthetic table")?;
    Ok(ConditionSource::new(level, table))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("=== drift-model: train and score ===\n");

    // -------------------------------------------------------------------------
    // 1. Inputs
    // -------------------------------------------------------------------------
    let sources = vec![
        synthetic_condition("preset_SSD", 0, 60, 1)?,
        synthetic_condition("staircase_SSD", 60, 60, 2)?,
    ];
    println!("1. Built {} conditions", sources.len());

    // -------------------------------------------------------------------------
    // 2. Train
    // -------------------------------------------------------------------------
    let config = TrainingConfig::builder()
        .model_name("risk-logreg-demo")
        .holdout(0.2)
        .build()
        .context("invalid training config")?;
    let trainer = Trainer::new(config)?;
    let outcome = trainer.run(&sources).context("training run failed")?;

    println!("\n2. Search ({:?} population)", outcome.search.population);
    for (i, candidate) in outcome.search.candidates.iter().enumerate() {
        let marker = if i == outcome.search.best_index { "*" } else { " " };
        println!(
            "   {marker} {:<24} auc {:.3} ± {:.3}",
            candidate.params.to_string(),
            candidate.mean,
            candidate.std
        );
    }
    if let Some(nested) = &outcome.nested {
        println!("   nested auc {:.3} ± {:.3}", nested.mean, nested.std);
    }
    if let Some(holdout) = &outcome.holdout {
        println!(
            "   held-out ({} rows): auc {:.3}, precision {:.3}, recall {:.3}, f1 {:.3}, {} roc points",
            holdout.rows,
            holdout.auc,
            holdout.precision,
            holdout.recall,
            holdout.f1,
            holdout.roc.thresholds.len()
        );
    }

    let kept = outcome.schema.masked(&outcome.search.pipeline.selected_mask());
    println!("   selected features: {}", kept.join(", "));

    // -------------------------------------------------------------------------
    // 3. Persist
    // -------------------------------------------------------------------------
    let path = std::env::temp_dir().join("drift-model-demo.json");
    outcome.save_artifact(&path)?;
    let run_id = outcome.run.run_id().to_string();
    println!("\n3. Saved artifact to {}", path.display());
    println!(
        "   ledger: {} candidate metrics, best step {:?}",
        trainer.store().metrics_for_run(&run_id, CV_AUC).len(),
        trainer.store().best_metric(&run_id, CV_AUC).map(|m| m.step())
    );

    // -------------------------------------------------------------------------
    // 4. Score
    // -------------------------------------------------------------------------
    let service = ScoringService::load(&path)?;
    let indicators = service.current().summary.condition_columns.clone();
    let mut record = Map::new();
    for name in service.schema() {
        let value = if indicators.contains(&name) { json!(0) } else { json!(0.5) };
        record.insert(name, value);
    }
    let body = serde_json::to_string(&record)?;
    println!("\n4. Scoring");
    println!("   ok:      {}", serde_json::to_string(&service.score_json(&body))?);

    record.remove("meanmt");
    let body = serde_json::to_string(&record)?;
    println!("   missing: {}", serde_json::to_string(&service.score_json(&body))?);

    std::fs::remove_file(&path).context("removing demo artifact")?;
    Ok(())
}
