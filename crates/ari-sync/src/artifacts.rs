//! Intermediate files handed from discovery to import.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ari_core::CandidateRecord;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const RAW_CANDIDATES: &str = "candidates_raw.csv";
pub const DEDUPED_CANDIDATES: &str = "candidates_deduped.csv";
pub const INTERMEDIARY_CANDIDATES: &str = "candidates_intermediary.csv";
pub const CONFIRMED_CANDIDATES: &str = "candidates_confirmed.csv";
pub const RUN_METADATA: &str = "run_metadata.json";

pub fn city_file_name(slug: &str) -> String {
    format!("confirmed_{slug}.csv")
}

/// Write candidates with a header row. Quoting follows RFC 4180.
pub fn write_candidates_csv(path: &Path, records: &[CandidateRecord]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    for record in records {
        writer
            .serialize(record)
            .with_context(|| format!("writing candidate to {}", path.display()))?;
    }
    writer
        .flush()
        .with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

pub fn read_candidates_csv(path: &Path) -> Result<Vec<CandidateRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    reader
        .deserialize()
        .enumerate()
        .map(|(idx, row)| row.with_context(|| format!("{} record {}", path.display(), idx + 1)))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub raw_rows: usize,
    pub raw_candidates: usize,
    pub not_current: usize,
    pub current: usize,
    pub deduplicated: usize,
    pub intermediary: usize,
    pub without_coordinates: usize,
    pub confirmed: usize,
    pub coordinates_backfilled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProvenance {
    pub source_id: String,
    pub package_id: String,
    pub resource_id: String,
    pub resource_url: String,
    pub last_modified: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub sha256: String,
    pub bytes: usize,
    pub stored_path: String,
    pub rows: usize,
    pub candidates: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub as_of: NaiveDate,
    pub radius_km: f64,
    pub cities: Vec<String>,
    pub counts: StageCounts,
    pub per_city: BTreeMap<String, usize>,
    pub unresolved_authorisation: usize,
    pub sources: Vec<SourceProvenance>,
    pub files: BTreeMap<String, String>,
}

pub fn write_run_metadata(path: &Path, metadata: &RunMetadata) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(metadata).context("serializing run metadata")?;
    std::fs::write(path, bytes).with_context(|| format!("writing {}", path.display()))
}

pub fn read_run_metadata(path: &Path) -> Result<RunMetadata> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// `path` relative to the run's output directory, for the metadata file list.
pub fn relative_name(out_dir: &Path, path: &Path) -> String {
    path.strip_prefix(out_dir)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}
