use std::path::PathBuf;

/// Errors raised while loading or aligning cohort tables.
///
/// All of these are fatal: a malformed table is a precondition violation, not
/// something the training core tries to recover from.
#[derive(Debug, thiserror::Error)]
pub enum CohortError {
    /// The table file could not be opened.
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV (ragged rows, bad UTF-8, ...).
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// A required column is absent from the header.
    #[error("{table} table has no `{column}` column")]
    MissingColumn { table: &'static str, column: String },

    /// A cell that must be numeric could not be parsed.
    #[error("{table} table, sample `{sample}`: cannot parse `{value}` in column `{column}`")]
    Parse {
        table: &'static str,
        sample: String,
        column: String,
        value: String,
    },

    /// The disease column holds something other than 0 or 1.
    #[error("sample `{sample}`: disease label `{value}` is not binary")]
    NonBinaryLabel { sample: String, value: String },

    /// Relative abundances must be non-negative.
    #[error("sample `{sample}`: negative abundance {value} for `{feature}`")]
    NegativeAbundance {
        sample: String,
        feature: String,
        value: f32,
    },

    /// NaN or infinite abundance cell.
    #[error("sample `{sample}`: non-finite abundance `{value}` for `{feature}`")]
    NonFiniteAbundance {
        sample: String,
        feature: String,
        value: String,
    },

    /// The same identifier appears twice in one table.
    #[error("{table} table: duplicate sample identifier `{sample}`")]
    DuplicateSample { table: &'static str, sample: String },

    /// No metadata row has a matching abundance row.
    #[error("no metadata sample matches the abundance table")]
    NoMatchingSamples,
}
