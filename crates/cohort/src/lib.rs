//! Abundance and metadata table I/O for confounder-free training.
//!
//! Loads a per-sample taxon abundance table and a metadata table keyed by the
//! same sample identifier, applies the log/CLR transform, and aligns both into
//! a [`Cohort`] of [`Sample`]s ready for fold splitting.

pub mod error;
pub mod reader;
pub mod types;

pub use error::CohortError;
pub use reader::{AbundanceTable, CohortReader, MetadataColumns, MetadataRecord};
pub use types::{Cohort, CohortSummary, Sample, Transform};
