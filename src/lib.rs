//! # drift-model: behavioral-risk screening pipeline
//!
//! Trains a binary classifier that estimates an attention-disorder risk
//! probability from kinematic and response-time features of a stop-signal
//! task, and serves the trained model behind a validated scoring surface.
//!
//! ## Pipeline
//!
//! ```text
//! SampleTable(s) ─► FeatureAssembler ─► derive_labels ─► SmoteBalancer
//!                                                             │
//!        ┌────────────────── GridSearch / NestedCrossValidation
//!        ▼
//!   Pipeline: Imputer ─► StandardScaler ─► FeatureSelector ─► Estimator
//!        │
//!        ▼
//!   ModelArtifact (JSON) ─► ScoringService
//! ```
//!
//! Every stage is fit on training folds only; held-out rows never influence
//! imputation statistics, scaling, the selected features or the model.
//!
//! ## Example
//!
//! ```rust,no_run
//! use drift_model::config::TrainingConfig;
//! use drift_model::features::ConditionSource;
//! use drift_model::storage::SampleTable;
//! use drift_model::training::Trainer;
//!
//! let preset = SampleTable::load_parquet("data/preset_ssd.parquet")?;
//! let staircase = SampleTable::load_parquet("data/staircase_ssd.parquet")?;
//!
//! let trainer = Trainer::new(TrainingConfig::default())?;
//! let outcome = trainer.run(&[
//!     ConditionSource::new("preset_SSD", preset),
//!     ConditionSource::new("staircase_SSD", staircase),
//! ])?;
//! println!("cv auc = {:.3}", outcome.search.best_score);
//! outcome.save_artifact("models/risk.json")?;
//! # Ok::<(), drift_model::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod balance;
pub mod config;
pub mod cv;
pub mod dataset;
pub mod error;
pub mod estimator;
pub mod features;
pub mod labels;
pub mod metrics;
pub mod persist;
pub mod pipeline;
pub mod preprocess;
pub mod scoring;
pub mod search;
pub mod selection;
pub mod storage;
pub mod tracking;
pub mod training;

pub use config::TrainingConfig;
pub use dataset::{Dataset, FeatureSchema};
pub use error::{Error, Result};
pub use persist::ModelArtifact;
pub use pipeline::Pipeline;
pub use scoring::{ScoreResponse, ScoringService};
pub use training::{Trainer, TrainingOutcome};
