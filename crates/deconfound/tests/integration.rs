//! Integration tests for the deconfound crate.
//!
//! These exercise the full pipeline on synthetic cohorts: CSV loading →
//! fold split → adversarial training → diagnostics → persisted artifacts.
//! All use the NdArray backend.

use std::io::Write;
use std::path::Path;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

use cohort::{Cohort, CohortReader, MetadataColumns, Sample, Transform};
use deconfound::model::bridge::{rows_to_tensor, tensor_to_array2};
use deconfound::report::{load_history, RESULTS_FILE};
use deconfound::training::data::{stratified_folds, FoldSplit};
use deconfound::{
    load_fold_model, train_cross_validated, train_fold, u_distance_correlation_sqr,
    ConfounderFreeConfig, EvaluationResults, TrainingConfig,
};
use ndarray::{Array1, Array2};

type TestBackend = NdArray<f32>;
type TestAutodiffBackend = Autodiff<NdArray<f32>>;

/// 60 controls and 40 cases over 20 features.
///
/// Features 0..5 carry the disease signal, 5..15 are driven by a continuous
/// confounder in [0, 1], 15..20 are noise.
fn confounded_cohort(seed: u64) -> Cohort {
    let mut rng = StdRng::seed_from_u64(seed);
    let samples = (0..100)
        .map(|i| {
            let disease = i >= 60;
            let confounder: f32 = rng.gen_range(0.0..1.0);
            let features = (0..20)
                .map(|j| {
                    let noise: f32 = rng.gen_range(-0.25..0.25);
                    match j {
                        0..=4 => noise + if disease { 1.0 } else { 0.0 },
                        5..=14 => 2.0 * confounder + noise * 0.4,
                        _ => noise,
                    }
                })
                .collect();
            Sample {
                id: format!("S{i:03}"),
                features,
                disease,
                confounders: vec![Some(confounder)],
            }
        })
        .collect();
    Cohort {
        feature_names: (0..20).map(|j| format!("taxon_{j}")).collect(),
        confounder_names: vec!["AGE".into()],
        samples,
    }
}

fn rows(cohort: &Cohort, indices: &[usize]) -> Vec<Vec<f32>> {
    indices.iter().map(|&i| cohort.samples[i].features.clone()).collect()
}

fn as_array(rows: &[Vec<f32>]) -> Array2<f64> {
    let cols = rows[0].len();
    Array2::from_shape_fn((rows.len(), cols), |(i, j)| rows[i][j] as f64)
}

/// Raw and learned distance correlation with the confounder on the held-out
/// controls of one fold.
fn held_out_control_dcor(config: &TrainingConfig, data: &Cohort, split: &FoldSplit, seed: u64) -> (f64, f64) {
    let model_config = ConfounderFreeConfig::new(20, 1).with_latent_dim(16);
    let mut rng = StdRng::seed_from_u64(seed);
    let outcome =
        train_fold::<TestAutodiffBackend>(config, &model_config, data, split, &mut rng, &Default::default()).unwrap();

    let controls: Vec<usize> = split
        .validation
        .iter()
        .copied()
        .filter(|&i| data.samples[i].is_control())
        .collect();
    assert!(controls.len() > 3);
    let confounder: Array1<f64> = controls
        .iter()
        .map(|&i| data.samples[i].confounders[0].unwrap() as f64)
        .collect();

    let raw_rows = rows(data, &controls);
    let raw = as_array(&raw_rows);
    let raw_dcor = u_distance_correlation_sqr(raw.view(), confounder.view());

    let refs: Vec<&[f32]> = raw_rows.iter().map(Vec::as_slice).collect();
    let frozen = outcome.model.valid();
    let learned = tensor_to_array2(frozen.encode(rows_to_tensor::<TestBackend>(&refs, &Default::default())));
    let learned_dcor = u_distance_correlation_sqr(learned.view(), confounder.view());
    (raw_dcor, learned_dcor)
}

#[test]
fn test_adversarial_training_reduces_confounder_dependence() {
    let tmp = TempDir::new().unwrap();
    let data = confounded_cohort(7);
    // No early stop and no learning-rate decay, so both runs see every epoch
    // at full rate.
    let base = TrainingConfig::new()
        .with_epochs(120)
        .with_patience(120)
        .with_scheduler_patience(1000)
        .with_batch_size(64)
        .with_folds(3)
        .with_output_dir(tmp.path().display().to_string());
    let split = stratified_folds(&data.labels(), base.folds, &mut StdRng::seed_from_u64(42))
        .unwrap()
        .remove(0);

    // Same split and seed with the adversary switched off
    let frozen_adversary = base.clone().with_lr_regressor(0.0).with_lr_distiller(0.0);
    let (raw_dcor, baseline_dcor) = held_out_control_dcor(&frozen_adversary, &data, &split, 42);

    let adversarial = base.with_lr_regressor(5e-3).with_lr_distiller(5e-3);
    let (_, learned_dcor) = held_out_control_dcor(&adversarial, &data, &split, 42);

    assert!(raw_dcor > 0.3, "raw features should carry the confounder: {raw_dcor}");
    assert!(
        learned_dcor < baseline_dcor - 0.05,
        "adversarial dcor {learned_dcor} should clearly undercut the non-adversarial {baseline_dcor} (raw {raw_dcor})"
    );
}

#[test]
fn test_cross_validation_writes_artifacts() {
    let tmp = TempDir::new().unwrap();
    let data = confounded_cohort(3);
    let config = TrainingConfig::new()
        .with_epochs(3)
        .with_batch_size(32)
        .with_control_batch_size(Some(16))
        .with_folds(2)
        .with_output_dir(tmp.path().display().to_string());
    let model_config = ConfounderFreeConfig::new(20, 1).with_latent_dim(8);
    let device = Default::default();

    let mut rng = StdRng::seed_from_u64(42);
    let report =
        train_cross_validated::<TestAutodiffBackend>(&config, &model_config, &data, &mut rng, &device).unwrap();

    assert_eq!(report.results.accuracies.len(), 2);
    assert_eq!(report.results.aucs.len(), 2);
    assert_eq!(report.results.f1s.len(), 2);
    assert_eq!(report.histories.len(), 2);

    for fold in 0..2 {
        assert!(tmp.path().join(format!("models/encoder_fold{fold}.mpk")).exists());
        assert!(tmp.path().join(format!("models/disease_classifier_fold{fold}.mpk")).exists());
        let history = load_history(&tmp.path().join(format!("history_fold{fold}.json"))).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history.fold, fold);
    }
    assert!(tmp.path().join("model_config.json").exists());

    let saved = EvaluationResults::load(&tmp.path().join(RESULTS_FILE)).unwrap();
    assert_eq!(saved, report.results);
    let expected_mean = saved.accuracies.iter().sum::<f64>() / 2.0;
    assert!((saved.mean_accuracy - expected_mean).abs() < 1e-12);
}

#[test]
fn test_saved_fold_model_reloads_with_same_predictions() {
    let tmp = TempDir::new().unwrap();
    let data = confounded_cohort(5);
    let config = TrainingConfig::new()
        .with_epochs(2)
        .with_folds(2)
        .with_output_dir(tmp.path().display().to_string());
    let model_config = ConfounderFreeConfig::new(20, 1).with_latent_dim(8);
    let device = Default::default();

    let mut rng = StdRng::seed_from_u64(9);
    let split = stratified_folds(&data.labels(), 2, &mut rng).unwrap().remove(1);
    let outcome =
        train_fold::<TestAutodiffBackend>(&config, &model_config, &data, &split, &mut rng, &device).unwrap();
    let models_dir = tmp.path().join("models");
    deconfound::training::trainer::save_fold_weights(&outcome.model, &models_dir, 1).unwrap();

    let reloaded = load_fold_model::<TestBackend>(&model_config, &models_dir, 1, &device).unwrap();
    let batch_rows = rows(&data, &split.validation[..6]);
    let refs: Vec<&[f32]> = batch_rows.iter().map(Vec::as_slice).collect();

    let original: Vec<f32> = outcome
        .model
        .valid()
        .forward(rows_to_tensor(&refs, &device))
        .into_data()
        .to_vec()
        .unwrap();
    let restored: Vec<f32> = reloaded.forward(rows_to_tensor(&refs, &device)).into_data().to_vec().unwrap();
    for (a, b) in original.iter().zip(&restored) {
        assert!((a - b).abs() < 1e-5, "prediction changed after reload: {a} vs {b}");
    }
}

fn write_file(path: &Path, contents: &str) {
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
}

#[test]
fn test_csv_tables_to_training() {
    let tmp = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(21);

    let mut abundance = String::from("SampleID,t1,t2,t3,t4\n");
    let mut metadata = String::from("SampleID,PATGROUPFINAL_C,AGE,BMI\n");
    for i in 0..24 {
        let disease = i % 2 == 0;
        let age: f32 = rng.gen_range(30.0..70.0);
        let counts: Vec<String> = (0..4)
            .map(|j| {
                let base = if disease && j == 0 { 40.0 } else { 10.0 };
                format!("{:.1}", base + rng.gen_range(0.0..5.0) + if j == 3 { age / 10.0 } else { 0.0 })
            })
            .collect();
        abundance.push_str(&format!("S{i},{}\n", counts.join(",")));
        // One control is missing BMI and must drop out of the control pool.
        let bmi = if i == 1 { "NA".to_string() } else { format!("{:.1}", 20.0 + i as f32 * 0.3) };
        metadata.push_str(&format!("S{i},{},{age:.1},{bmi}\n", u8::from(disease)));
    }
    let abundance_path = tmp.path().join("abundance.csv");
    let metadata_path = tmp.path().join("metadata.csv");
    write_file(&abundance_path, &abundance);
    write_file(&metadata_path, &metadata);

    let columns = MetadataColumns {
        confounders: vec!["AGE".into(), "BMI".into()],
        ..Default::default()
    };
    let data = CohortReader::load(&abundance_path, &metadata_path, &columns, Transform::Log1p).unwrap();
    assert_eq!(data.len(), 24);
    assert_eq!(data.summary().complete_controls, 11);

    let out = tmp.path().join("out");
    let config = TrainingConfig::new()
        .with_epochs(2)
        .with_batch_size(8)
        .with_folds(3)
        .with_output_dir(out.display().to_string());
    let model_config = ConfounderFreeConfig::new(data.n_features(), data.n_confounders()).with_latent_dim(4);

    let report = train_cross_validated::<TestAutodiffBackend>(
        &config,
        &model_config,
        &data,
        &mut rng,
        &Default::default(),
    )
    .unwrap();
    assert_eq!(report.results.accuracies.len(), 3);
    // Control and disease traces for each of the two confounders
    assert!(report.histories.iter().all(|h| h.dependence.len() == 4));
    assert!(out.join(RESULTS_FILE).exists());
}
