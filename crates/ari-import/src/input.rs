//! Reading and validating the candidate file produced by discovery.

use std::path::Path;

use anyhow::{Context, Result};
use ari_core::normalize::{
    clean_text, non_empty, normalize_locality, normalize_postcode, parse_state, registration_numbers,
};
use ari_core::{Coordinates, CredentialType, EntityKind, RegionCode};
use serde::Deserialize;
use tracing::debug;

/// One row as written by discovery. Hand-built files may carry a single
/// `abn_acn` column instead of separate `abn`/`acn`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImportRow {
    pub source_dataset: Option<String>,
    pub entity_kind: Option<String>,
    pub credential_type: Option<String>,
    pub credential_number: Option<String>,
    pub licensee_number: Option<String>,
    pub name: Option<String>,
    pub abn: Option<String>,
    pub acn: Option<String>,
    pub abn_acn: Option<String>,
    pub locality: Option<String>,
    pub state: Option<String>,
    pub postcode: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub status: Option<String>,
    pub dataset_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRecord {
    pub source_dataset: Option<String>,
    pub entity_kind: EntityKind,
    pub credential_type: CredentialType,
    pub credential_number: String,
    pub licensee_number: Option<String>,
    pub name: String,
    pub abn: Option<String>,
    pub acn: Option<String>,
    pub locality: String,
    pub state: RegionCode,
    pub postcode: String,
    pub coordinates: Option<Coordinates>,
    pub dataset_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRejection {
    MissingName,
    MissingCredentialNumber,
    InvalidCredentialType,
    InvalidState,
    MissingLocality,
}

fn text(value: &Option<String>) -> Option<String> {
    value.as_deref().and_then(non_empty)
}

impl ImportRow {
    pub fn validate(&self) -> Result<ImportRecord, RowRejection> {
        let name = text(&self.name).ok_or(RowRejection::MissingName)?;
        let credential_number = text(&self.credential_number).ok_or(RowRejection::MissingCredentialNumber)?;
        let credential_type = text(&self.credential_type)
            .and_then(|t| t.parse::<CredentialType>().ok())
            .ok_or(RowRejection::InvalidCredentialType)?;
        let state = self
            .state
            .as_deref()
            .and_then(parse_state)
            .ok_or(RowRejection::InvalidState)?;
        let locality = text(&self.locality)
            .map(|l| normalize_locality(&l))
            .ok_or(RowRejection::MissingLocality)?;

        let entity_kind = text(&self.entity_kind)
            .and_then(|k| k.parse::<EntityKind>().ok())
            .unwrap_or(match credential_type {
                CredentialType::Acl => EntityKind::Licensee,
                CredentialType::Acr => EntityKind::Representative,
            });
        let (abn, acn) = registration_numbers(
            [&self.abn, &self.acn, &self.abn_acn]
                .into_iter()
                .filter_map(|v| v.as_deref()),
        );
        let coordinates = match (self.lat, self.lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => Some(Coordinates { lat, lng }),
            _ => None,
        };

        Ok(ImportRecord {
            source_dataset: text(&self.source_dataset),
            entity_kind,
            credential_type,
            credential_number: clean_text(&credential_number),
            licensee_number: text(&self.licensee_number),
            name: clean_text(&name),
            abn,
            acn,
            locality,
            state,
            postcode: normalize_postcode(self.postcode.as_deref().unwrap_or_default()),
            coordinates,
            dataset_url: text(&self.dataset_url),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub rows: usize,
    pub records: Vec<ImportRecord>,
    pub invalid: usize,
    valid: usize,
}

impl ImportBatch {
    /// Valid rows in the file, before any limit.
    pub fn valid(&self) -> usize {
        self.valid
    }

    /// Keep only the first `limit` valid records.
    pub fn truncate(&mut self, limit: Option<usize>) {
        if let Some(limit) = limit {
            self.records.truncate(limit);
        }
    }
}

pub fn read_batch(reader: impl std::io::Read) -> Result<ImportBatch> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut batch = ImportBatch::default();
    for (idx, row) in reader.deserialize::<ImportRow>().enumerate() {
        batch.rows += 1;
        let row = match row {
            Ok(row) => row,
            Err(err) => {
                debug!(row = idx + 1, error = %err, "unreadable candidate row");
                batch.invalid += 1;
                continue;
            }
        };
        match row.validate() {
            Ok(record) => {
                batch.valid += 1;
                batch.records.push(record);
            }
            Err(reason) => {
                debug!(row = idx + 1, ?reason, "rejected candidate row");
                batch.invalid += 1;
            }
        }
    }
    Ok(batch)
}

pub fn read_batch_file(path: &Path) -> Result<ImportBatch> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    read_batch(file).with_context(|| format!("reading {}", path.display()))
}
