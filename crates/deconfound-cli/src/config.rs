//! TOML config loading for the training CLI.
//!
//! Deserializes `configs/train.toml`, which has `[training]`, `[model]` and
//! `[data]` sections, then merges with CLI overrides.

use std::path::{Path, PathBuf};

use cohort::{MetadataColumns, Transform};
use deconfound::{Activation, ConfounderFreeConfig, TrainingConfig};
use serde::Deserialize;

pub const DEFAULT_SEED: u64 = 42;

/// Top-level structure matching `configs/train.toml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TrainToml {
    pub training: TrainingOverrides,
    pub model: ModelOverrides,
    pub data: DataSection,
}

/// Optional overrides for `TrainingConfig` fields, plus the RNG seed.
///
/// The same struct carries TOML values and CLI flags so both layers merge
/// through one code path.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingOverrides {
    pub epochs: Option<usize>,
    pub batch_size: Option<usize>,
    pub control_batch_size: Option<usize>,
    pub lr_regressor: Option<f64>,
    pub lr_distiller: Option<f64>,
    pub lr_classifier: Option<f64>,
    pub folds: Option<usize>,
    /// Early-stopping patience in epochs.
    pub patience: Option<usize>,
    pub scheduler_factor: Option<f64>,
    pub scheduler_patience: Option<usize>,
    pub scheduler_threshold: Option<f64>,
    pub replacement: Option<bool>,
    pub mi_neighbors: Option<usize>,
    pub output_dir: Option<String>,
    pub seed: Option<u64>,
}

/// Optional overrides for `ConfounderFreeConfig` hyperparameters.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ModelOverrides {
    pub latent_dim: Option<usize>,
    pub num_layers: Option<usize>,
    pub activation: Option<Activation>,
    pub bn_epsilon: Option<f64>,
    pub bn_momentum: Option<f64>,
}

/// Where the cohort tables live and which metadata columns to read.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct DataSection {
    pub abundance: Option<PathBuf>,
    pub metadata: Option<PathBuf>,
    pub id_column: Option<String>,
    pub disease_column: Option<String>,
    pub confounders: Option<Vec<String>>,
    pub transform: Option<Transform>,
}

/// Fully resolved cohort source.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub abundance: PathBuf,
    pub metadata: PathBuf,
    pub columns: MetadataColumns,
    pub transform: Transform,
}

/// Load and deserialize a `TrainToml` from a TOML file.
pub fn load_train_toml(path: &Path) -> anyhow::Result<TrainToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
    let config: TrainToml = toml::from_str(&contents)?;
    tracing::info!(path = %path.display(), "Loaded training config");
    Ok(config)
}

fn apply_training(config: TrainingConfig, o: &TrainingOverrides) -> TrainingConfig {
    let mut config = config;
    if let Some(v) = o.epochs {
        config.epochs = v;
    }
    if let Some(v) = o.batch_size {
        config.batch_size = v;
    }
    if o.control_batch_size.is_some() {
        config.control_batch_size = o.control_batch_size;
    }
    if let Some(v) = o.lr_regressor {
        config.lr_regressor = v;
    }
    if let Some(v) = o.lr_distiller {
        config.lr_distiller = v;
    }
    if let Some(v) = o.lr_classifier {
        config.lr_classifier = v;
    }
    if let Some(v) = o.folds {
        config.folds = v;
    }
    if let Some(v) = o.patience {
        config.patience = v;
    }
    if let Some(v) = o.scheduler_factor {
        config.scheduler_factor = v;
    }
    if let Some(v) = o.scheduler_patience {
        config.scheduler_patience = v;
    }
    if let Some(v) = o.scheduler_threshold {
        config.scheduler_threshold = v;
    }
    if let Some(v) = o.replacement {
        config.replacement = v;
    }
    if let Some(v) = o.mi_neighbors {
        config.mi_neighbors = v;
    }
    if let Some(v) = &o.output_dir {
        config.output_dir = v.clone();
    }
    config
}

/// Build a `TrainingConfig` from defaults, TOML overrides, and CLI flags.
///
/// Priority chain: `TrainingConfig::new()` defaults < TOML values < CLI flags.
pub fn build_training_config(toml: &TrainingOverrides, cli: &TrainingOverrides) -> TrainingConfig {
    apply_training(apply_training(TrainingConfig::new(), toml), cli)
}

pub fn resolve_seed(toml: &TrainingOverrides, cli: &TrainingOverrides) -> u64 {
    cli.seed.or(toml.seed).unwrap_or(DEFAULT_SEED)
}

/// Build the model config once the cohort's shape is known.
pub fn build_model_config(
    toml: &ModelOverrides,
    cli: &ModelOverrides,
    input_dim: usize,
    n_confounders: usize,
) -> ConfounderFreeConfig {
    let mut config = ConfounderFreeConfig::new(input_dim, n_confounders);
    for o in [toml, cli] {
        if let Some(v) = o.latent_dim {
            config.latent_dim = v;
        }
        if let Some(v) = o.num_layers {
            config.num_layers = v;
        }
        if let Some(v) = o.activation {
            config.activation = v;
        }
        if let Some(v) = o.bn_epsilon {
            config.bn_epsilon = v;
        }
        if let Some(v) = o.bn_momentum {
            config.bn_momentum = v;
        }
    }
    config
}

/// Resolve the cohort tables and column names. CLI values win over TOML.
pub fn resolve_data_source(toml: &DataSection, cli: &DataSection) -> anyhow::Result<DataSource> {
    let abundance = cli
        .abundance
        .clone()
        .or_else(|| toml.abundance.clone())
        .ok_or_else(|| anyhow::anyhow!("No abundance table given (--abundance or [data].abundance)"))?;
    let metadata = cli
        .metadata
        .clone()
        .or_else(|| toml.metadata.clone())
        .ok_or_else(|| anyhow::anyhow!("No metadata table given (--metadata or [data].metadata)"))?;

    let defaults = MetadataColumns::default();
    let columns = MetadataColumns {
        id: cli.id_column.clone().or_else(|| toml.id_column.clone()).unwrap_or(defaults.id),
        disease: cli
            .disease_column
            .clone()
            .or_else(|| toml.disease_column.clone())
            .unwrap_or(defaults.disease),
        confounders: cli
            .confounders
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| toml.confounders.clone())
            .unwrap_or_default(),
    };
    if columns.confounders.is_empty() {
        anyhow::bail!("No confounder columns given (--confounders or [data].confounders)");
    }

    Ok(DataSource {
        abundance,
        metadata,
        columns,
        transform: cli.transform.or(toml.transform).unwrap_or_default(),
    })
}
