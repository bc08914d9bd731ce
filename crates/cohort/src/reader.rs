//! Reads abundance and metadata CSV tables and aligns them by sample ID.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CohortError;
use crate::types::{Cohort, Sample, Transform};

/// Per-sample abundance rows, already transformed.
#[derive(Debug, Clone)]
pub struct AbundanceTable {
    pub feature_names: Vec<String>,
    pub sample_ids: Vec<String>,
    pub rows: Vec<Vec<f32>>,
}

/// One metadata row restricted to the columns training needs.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub id: String,
    pub disease: bool,
    pub confounders: Vec<Option<f32>>,
}

/// Metadata column names for the identifier, disease flag and confounders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataColumns {
    #[serde(default = "default_id_column")]
    pub id: String,
    #[serde(default = "default_disease_column")]
    pub disease: String,
    #[serde(default)]
    pub confounders: Vec<String>,
}

fn default_id_column() -> String {
    "SampleID".to_string()
}

fn default_disease_column() -> String {
    "PATGROUPFINAL_C".to_string()
}

impl Default for MetadataColumns {
    fn default() -> Self {
        Self {
            id: default_id_column(),
            disease: default_disease_column(),
            confounders: Vec::new(),
        }
    }
}

/// Static methods for loading cohort tables.
pub struct CohortReader;

impl CohortReader {
    /// Load both tables from disk and align them.
    pub fn load(
        abundance_path: &Path,
        metadata_path: &Path,
        columns: &MetadataColumns,
        transform: Transform,
    ) -> Result<Cohort, CohortError> {
        let abundance = Self::read_abundance(abundance_path, &columns.id, transform)?;
        let metadata = Self::read_metadata(metadata_path, columns)?;
        let cohort = Self::align(abundance, metadata, columns.confounders.clone())?;
        tracing::info!(
            abundance = %abundance_path.display(),
            metadata = %metadata_path.display(),
            %transform,
            "Loaded cohort: {}",
            cohort.summary()
        );
        Ok(cohort)
    }

    /// Read an abundance CSV: one identifier column plus one column per taxon.
    pub fn read_abundance(
        path: &Path,
        id_column: &str,
        transform: Transform,
    ) -> Result<AbundanceTable, CohortError> {
        Self::read_abundance_from(open(path)?, id_column, transform)
    }

    /// Read an abundance table from any reader.
    pub fn read_abundance_from<R: Read>(
        reader: R,
        id_column: &str,
        transform: Transform,
    ) -> Result<AbundanceTable, CohortError> {
        let mut csv = csv_reader(reader);
        let headers = csv.headers()?.clone();
        let id_idx = column_index(&headers, "abundance", id_column)?;
        let feature_names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != id_idx)
            .map(|(_, h)| h.to_string())
            .collect();

        let mut seen = HashSet::new();
        let mut sample_ids = Vec::new();
        let mut rows = Vec::new();
        for record in csv.records() {
            let record = record?;
            let id = record.get(id_idx).unwrap_or_default().to_string();
            if !seen.insert(id.clone()) {
                return Err(CohortError::DuplicateSample {
                    table: "abundance",
                    sample: id,
                });
            }

            let mut row = Vec::with_capacity(feature_names.len());
            for (i, cell) in record.iter().enumerate().filter(|&(i, _)| i != id_idx) {
                let value: f32 = cell.parse().map_err(|_| CohortError::Parse {
                    table: "abundance",
                    sample: id.clone(),
                    column: headers.get(i).unwrap_or_default().to_string(),
                    value: cell.to_string(),
                })?;
                if !value.is_finite() {
                    return Err(CohortError::NonFiniteAbundance {
                        sample: id,
                        feature: headers.get(i).unwrap_or_default().to_string(),
                        value: cell.to_string(),
                    });
                }
                if value < 0.0 {
                    return Err(CohortError::NegativeAbundance {
                        sample: id,
                        feature: headers.get(i).unwrap_or_default().to_string(),
                        value,
                    });
                }
                row.push(value);
            }
            transform.apply(&mut row);
            sample_ids.push(id);
            rows.push(row);
        }

        tracing::debug!(
            samples = rows.len(),
            features = feature_names.len(),
            "Read abundance table"
        );
        Ok(AbundanceTable {
            feature_names,
            sample_ids,
            rows,
        })
    }

    /// Read a metadata CSV, keeping the identifier, disease and confounder columns.
    pub fn read_metadata(
        path: &Path,
        columns: &MetadataColumns,
    ) -> Result<Vec<MetadataRecord>, CohortError> {
        Self::read_metadata_from(open(path)?, columns)
    }

    /// Read metadata from any reader.
    pub fn read_metadata_from<R: Read>(
        reader: R,
        columns: &MetadataColumns,
    ) -> Result<Vec<MetadataRecord>, CohortError> {
        let mut csv = csv_reader(reader);
        let headers = csv.headers()?.clone();
        let id_idx = column_index(&headers, "metadata", &columns.id)?;
        let disease_idx = column_index(&headers, "metadata", &columns.disease)?;
        let confounder_idx = columns
            .confounders
            .iter()
            .map(|c| column_index(&headers, "metadata", c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for record in csv.records() {
            let record = record?;
            let id = record.get(id_idx).unwrap_or_default().to_string();
            if !seen.insert(id.clone()) {
                return Err(CohortError::DuplicateSample {
                    table: "metadata",
                    sample: id,
                });
            }

            let raw_disease = record.get(disease_idx).unwrap_or_default();
            let disease = parse_binary(raw_disease).ok_or_else(|| CohortError::NonBinaryLabel {
                sample: id.clone(),
                value: raw_disease.to_string(),
            })?;

            let mut confounders = Vec::with_capacity(confounder_idx.len());
            for (&idx, name) in confounder_idx.iter().zip(&columns.confounders) {
                let cell = record.get(idx).unwrap_or_default();
                confounders.push(parse_optional(cell).map_err(|_| CohortError::Parse {
                    table: "metadata",
                    sample: id.clone(),
                    column: name.clone(),
                    value: cell.to_string(),
                })?);
            }

            records.push(MetadataRecord {
                id,
                disease,
                confounders,
            });
        }
        Ok(records)
    }

    /// Reindex abundance rows by the metadata identifiers.
    ///
    /// Metadata order is kept. Metadata rows with no abundance profile are
    /// dropped with a warning; abundance rows with no metadata are ignored.
    pub fn align(
        abundance: AbundanceTable,
        metadata: Vec<MetadataRecord>,
        confounder_names: Vec<String>,
    ) -> Result<Cohort, CohortError> {
        let mut by_id: HashMap<String, Vec<f32>> = abundance
            .sample_ids
            .into_iter()
            .zip(abundance.rows)
            .collect();

        let mut samples = Vec::with_capacity(metadata.len());
        let mut unmatched = 0usize;
        for record in metadata {
            match by_id.remove(&record.id) {
                Some(features) => samples.push(Sample {
                    id: record.id,
                    features,
                    disease: record.disease,
                    confounders: record.confounders,
                }),
                None => unmatched += 1,
            }
        }

        if samples.is_empty() {
            return Err(CohortError::NoMatchingSamples);
        }
        if unmatched > 0 {
            tracing::warn!(unmatched, "Metadata samples without an abundance profile were dropped");
        }
        if !by_id.is_empty() {
            tracing::debug!(unused = by_id.len(), "Abundance samples without metadata ignored");
        }

        Ok(Cohort {
            feature_names: abundance.feature_names,
            confounder_names,
            samples,
        })
    }
}

fn open(path: &Path) -> Result<std::fs::File, CohortError> {
    std::fs::File::open(path).map_err(|source| CohortError::Open {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_reader<R: Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader)
}

fn column_index(
    headers: &csv::StringRecord,
    table: &'static str,
    column: &str,
) -> Result<usize, CohortError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| CohortError::MissingColumn {
            table,
            column: column.to_string(),
        })
}

fn parse_binary(cell: &str) -> Option<bool> {
    match cell.parse::<f64>() {
        Ok(v) if v == 0.0 => Some(false),
        Ok(v) if v == 1.0 => Some(true),
        _ => None,
    }
}

fn parse_optional(cell: &str) -> Result<Option<f32>, std::num::ParseFloatError> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("nan") {
        return Ok(None);
    }
    cell.parse::<f32>().map(Some)
}
