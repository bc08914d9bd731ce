mod config;
mod pipeline;
pub mod results;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cohort::Transform;
use deconfound::Activation;

use config::{DataSection, ModelOverrides, TrainingOverrides};
use pipeline::{SummaryArgs, TrainArgs};

/// deconfound: adversarial confounder-free representation learning for microbiome cohorts.
#[derive(Parser)]
#[command(name = "deconfound", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands for training and reporting.
#[derive(Subcommand)]
enum Command {
    /// Run k-fold adversarial training on an abundance + metadata cohort.
    Train {
        /// Path to training config TOML file.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Abundance CSV (sample ID column plus one column per taxon).
        #[arg(long)]
        abundance: Option<PathBuf>,
        /// Metadata CSV keyed by the same sample IDs.
        #[arg(long)]
        metadata: Option<PathBuf>,
        /// Confounder columns in the metadata table (e.g. AGE,BMI,METFORMIN_C).
        #[arg(long, value_delimiter = ',')]
        confounders: Option<Vec<String>>,
        /// Sample identifier column. Default: SampleID.
        #[arg(long)]
        id_column: Option<String>,
        /// Binary disease column. Default: PATGROUPFINAL_C.
        #[arg(long)]
        disease_column: Option<String>,
        /// Abundance transform: none, log1p or clr. Default: log1p.
        #[arg(long)]
        transform: Option<Transform>,
        /// Directory for weights, histories, plots and results.
        #[arg(long)]
        output: Option<String>,
        /// Override maximum epochs per fold.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the number of folds.
        #[arg(long)]
        folds: Option<usize>,
        /// Override the classifier batch size.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override the regressor/distiller batch size.
        #[arg(long)]
        control_batch_size: Option<usize>,
        #[arg(long)]
        lr_regressor: Option<f64>,
        #[arg(long)]
        lr_distiller: Option<f64>,
        #[arg(long)]
        lr_classifier: Option<f64>,
        /// Override early-stopping patience.
        #[arg(long)]
        patience: Option<usize>,
        /// Draw batches with replacement (true or false).
        #[arg(long)]
        replacement: Option<bool>,
        /// RNG seed for fold assignment and batch sampling. Default: 42.
        #[arg(long)]
        seed: Option<u64>,
        /// Override the latent width.
        #[arg(long)]
        latent_dim: Option<usize>,
        /// Override the number of hidden layers per sub-network.
        #[arg(long)]
        num_layers: Option<usize>,
        /// Activation: silu, relu, gelu or tanh.
        #[arg(long)]
        activation: Option<Activation>,
    },
    /// Print the per-fold table from an evaluation_results.json.
    Summary {
        /// Path to the results JSON or the training output directory.
        #[arg(long)]
        input: PathBuf,
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            abundance,
            metadata,
            confounders,
            id_column,
            disease_column,
            transform,
            output,
            epochs,
            folds,
            batch_size,
            control_batch_size,
            lr_regressor,
            lr_distiller,
            lr_classifier,
            patience,
            replacement,
            seed,
            latent_dim,
            num_layers,
            activation,
        } => pipeline::run_train(TrainArgs {
            config,
            data: DataSection {
                abundance,
                metadata,
                id_column,
                disease_column,
                confounders,
                transform,
            },
            training: TrainingOverrides {
                epochs,
                batch_size,
                control_batch_size,
                lr_regressor,
                lr_distiller,
                lr_classifier,
                folds,
                patience,
                replacement,
                output_dir: output,
                seed,
                ..Default::default()
            },
            model: ModelOverrides {
                latent_dim,
                num_layers,
                activation,
                ..Default::default()
            },
        }),
        Command::Summary { input, json } => pipeline::run_summary(SummaryArgs { input, json }),
    }
}
