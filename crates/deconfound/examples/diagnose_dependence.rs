//! Compare confounder dependence of raw features and learned encodings.
//!
//! Usage:
//!   cargo run --release -p deconfound --example diagnose_dependence -- \
//!     --abundance data/abundance.csv --metadata data/metadata.csv \
//!     --confounders AGE BMI METFORMIN_C \
//!     --output output --fold 0

use std::path::PathBuf;

use burn::backend::NdArray;
use burn::prelude::*;
use clap::Parser;
use ndarray::Array2;

use cohort::{CohortReader, MetadataColumns, Transform};
use deconfound::diagnostics::{mutual_information, u_distance_correlation_sqr, Group};
use deconfound::model::bridge::{rows_to_tensor, tensor_to_array2};
use deconfound::training::data::dependence_subsets;
use deconfound::{load_fold_model, ConfounderFreeConfig};

#[derive(Parser)]
struct Args {
    /// Abundance CSV (one row per sample).
    #[arg(long)]
    abundance: PathBuf,
    /// Metadata CSV keyed by the same sample IDs.
    #[arg(long)]
    metadata: PathBuf,
    /// Confounder columns to score.
    #[arg(long, num_args = 1..)]
    confounders: Vec<String>,
    /// Training output directory (holds model_config.json and models/).
    #[arg(long, default_value = "output")]
    output: PathBuf,
    #[arg(long, default_value_t = 0)]
    fold: usize,
    #[arg(long, default_value = "log1p")]
    transform: Transform,
    /// Neighbour count for mutual information.
    #[arg(long, default_value_t = 3)]
    neighbors: usize,
}

fn to_array(rows: &[&[f32]]) -> Array2<f64> {
    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    Array2::from_shape_fn((rows.len(), cols), |(i, j)| rows[i][j] as f64)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let columns = MetadataColumns {
        confounders: args.confounders.clone(),
        ..Default::default()
    };
    let cohort = CohortReader::load(&args.abundance, &args.metadata, &columns, args.transform)?;
    println!("{}", cohort.summary());

    let model_config = ConfounderFreeConfig::load(args.output.join("model_config.json"))
        .map_err(|e| anyhow::anyhow!("Failed to read model config: {e}"))?;
    let device = Default::default();
    let model = load_fold_model::<NdArray>(&model_config, &args.output.join("models"), args.fold, &device)?;

    let everyone: Vec<usize> = (0..cohort.len()).collect();
    for subset in dependence_subsets(&cohort, &everyone) {
        let label = match subset.group {
            Group::Control => "Controls",
            Group::Disease => "Cases",
        };
        println!("\n=== {label} ({} samples) ===", subset.len());
        if subset.is_empty() {
            println!("  no confounder-complete samples");
            continue;
        }

        let rows = subset.rows(&cohort);
        let raw = to_array(&rows);
        let learned = tensor_to_array2(model.encode(rows_to_tensor::<NdArray>(&rows, &device)));
        println!("  raw width {}, latent width {}", raw.ncols(), learned.ncols());

        println!("  {:<16} {:>10} {:>10} {:>10} {:>10}", "confounder", "dcor raw", "dcor z", "mi raw", "mi z");
        for (j, name) in cohort.confounder_names.iter().enumerate() {
            let target = subset.targets.column(j);
            println!(
                "  {:<16} {:>10.4} {:>10.4} {:>10.4} {:>10.4}",
                name,
                u_distance_correlation_sqr(raw.view(), target),
                u_distance_correlation_sqr(learned.view(), target),
                mutual_information(raw.view(), target, args.neighbors),
                mutual_information(learned.view(), target, args.neighbors),
            );
        }
    }

    Ok(())
}
