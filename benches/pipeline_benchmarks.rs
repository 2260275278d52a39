//! Training pipeline benchmarks
//!
//! - Oversampling
//! - Logistic and boosted fits
//! - Feature elimination
//! - Grid search over the default logistic grid
//! - Single-record scoring

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use drift_model::balance::SmoteBalancer;
use drift_model::cv::StratifiedKFold;
use drift_model::dataset::{Dataset, FeatureSchema};
use drift_model::estimator::{BoostingParams, EstimatorParams};
use drift_model::pipeline::{Pipeline, PipelineSpec};
use drift_model::search::{GridSearch, ParamGrid};
use drift_model::selection::FeatureSelector;
use ndarray::{Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Imbalanced dataset (20% positives) with a few informative columns
#[allow(clippy::cast_precision_loss)]
fn create_dataset(rows: usize, cols: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut x = Array2::<f64>::zeros((rows, cols));
    let mut y = Array1::<u8>::zeros(rows);
    for i in 0..rows {
        let label = u8::from(i % 5 == 0);
        y[i] = label;
        for j in 0..cols {
            let signal = if j < 3 { f64::from(label) } else { 0.0 };
            x[[i, j]] = signal + rng.gen_range(-1.0..1.0);
        }
    }
    let names: Vec<String> = (0..cols).map(|j| format!("f{j}")).collect();
    Dataset::new(x, y, FeatureSchema::new(names).unwrap()).unwrap()
}

fn bench_balance(c: &mut Criterion) {
    let mut group = c.benchmark_group("smote");
    for rows in [100, 1_000] {
        let data = create_dataset(rows, 15);
        group.bench_with_input(BenchmarkId::from_parameter(rows), &data, |b, data| {
            b.iter(|| SmoteBalancer::default().balance(black_box(data)).unwrap());
        });
    }
    group.finish();
}

fn bench_estimators(c: &mut Criterion) {
    let data = create_dataset(500, 15);
    let mut group = c.benchmark_group("estimator_fit");
    group.bench_function("logistic", |b| {
        b.iter(|| {
            EstimatorParams::logistic(1.0)
                .fit(black_box(data.features()), data.labels())
                .unwrap()
        });
    });
    group.bench_function("boosted", |b| {
        let params = EstimatorParams::Boosted(BoostingParams {
            n_estimators: 50,
            ..BoostingParams::default()
        });
        b.iter(|| params.fit(black_box(data.features()), data.labels()).unwrap());
    });
    group.finish();
}

fn bench_selection(c: &mut Criterion) {
    let data = create_dataset(200, 15);
    c.bench_function("rfecv_15_features", |b| {
        b.iter(|| {
            FeatureSelector::default()
                .fit(black_box(data.features()), data.labels())
                .unwrap()
        });
    });
}

fn bench_grid_search(c: &mut Criterion) {
    let data = create_dataset(200, 15);
    let spec = PipelineSpec {
        selection: None,
        ..PipelineSpec::default()
    };
    let search = GridSearch::new(
        ParamGrid::logistic_default(),
        spec,
        StratifiedKFold::new(5, true, 42).unwrap(),
    );
    let mut group = c.benchmark_group("grid_search");
    group.sample_size(10);
    group.bench_function("logistic_default_grid", |b| {
        b.iter(|| search.fit(black_box(&data)).unwrap());
    });
    group.finish();
}

fn bench_scoring(c: &mut Criterion) {
    let data = create_dataset(200, 15);
    let pipeline = Pipeline::fit(
        &PipelineSpec::default(),
        &EstimatorParams::logistic(1.0),
        data.features(),
        data.labels(),
    )
    .unwrap();
    let row: Vec<f64> = data.features().row(0).to_vec();
    c.bench_function("predict_row", |b| {
        b.iter(|| pipeline.predict_row(black_box(&row)).unwrap());
    });
}

criterion_group!(
    benches,
    bench_balance,
    bench_estimators,
    bench_selection,
    bench_grid_search,
    bench_scoring
);
criterion_main!(benches);
