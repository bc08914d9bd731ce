//! Training pipeline and results reporting.

use std::path::PathBuf;
use std::time::Instant;

use burn::backend::Autodiff;
use rand::rngs::StdRng;
use rand::SeedableRng;

use cohort::CohortReader;
use deconfound::report::RESULTS_FILE;
use deconfound::{train_cross_validated, EvaluationResults};

use crate::config::{
    build_model_config, build_training_config, load_train_toml, resolve_data_source, resolve_seed,
    DataSection, ModelOverrides, TrainToml, TrainingOverrides,
};
use crate::results::format_summary;

#[cfg(not(feature = "wgpu"))]
type TrainBackend = Autodiff<burn::backend::NdArray<f32>>;
#[cfg(feature = "wgpu")]
type TrainBackend = Autodiff<burn::backend::Wgpu>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Optional TOML config; CLI values override it.
    pub config: Option<PathBuf>,
    pub data: DataSection,
    pub training: TrainingOverrides,
    pub model: ModelOverrides,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    /// Results JSON, or the output directory holding it.
    pub input: PathBuf,
    /// Print JSON instead of the table.
    pub json: bool,
}

/// Load the cohort, run k-fold adversarial training and print per-fold results.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config
    let toml = match &args.config {
        Some(path) => load_train_toml(path)?,
        None => TrainToml::default(),
    };

    // 2. Load cohort
    let source = resolve_data_source(&toml.data, &args.data)?;
    tracing::info!(
        abundance = %source.abundance.display(),
        metadata = %source.metadata.display(),
        confounders = ?source.columns.confounders,
        transform = %source.transform,
        "Loading cohort"
    );
    let cohort = CohortReader::load(&source.abundance, &source.metadata, &source.columns, source.transform)?;
    let summary = cohort.summary();
    tracing::info!(%summary, missing = ?summary.missing_confounders, "Loaded cohort");

    // 3. Resolve hyperparameters
    let config = build_training_config(&toml.training, &args.training);
    let model_config = build_model_config(&toml.model, &args.model, cohort.n_features(), cohort.n_confounders());
    let seed = resolve_seed(&toml.training, &args.training);
    tracing::info!(
        epochs = config.epochs,
        folds = config.folds,
        batch_size = config.batch_size,
        control_batch_size = config.effective_control_batch_size(),
        latent_dim = model_config.latent_dim,
        activation = %model_config.activation,
        seed,
        "Starting cross-validated training"
    );

    // 4. Train
    let mut rng = StdRng::seed_from_u64(seed);
    let device = Default::default();
    let report = train_cross_validated::<TrainBackend>(&config, &model_config, &cohort, &mut rng, &device)?;

    // 5. Print summary
    let elapsed = start.elapsed();
    println!("\n--- Cross-validation Summary ---");
    print!("{}", format_summary(&report.results));
    println!("Output: {}", config.output_dir);
    println!("Elapsed: {:.1}s", elapsed.as_secs_f64());

    Ok(())
}

/// Print a saved `evaluation_results.json`.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let path = if args.input.is_dir() {
        args.input.join(RESULTS_FILE)
    } else {
        args.input.clone()
    };
    let results = EvaluationResults::load(&path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("--- Cross-validation Summary ---");
        println!("File: {}", path.display());
        println!("Folds: {}", results.accuracies.len());
        print!("{}", format_summary(&results));
    }
    Ok(())
}
