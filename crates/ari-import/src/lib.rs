//! Import stage: candidate file → entity graph in Postgres.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Serialize;
use tracing::info;

pub mod cascade;
pub mod config;
pub mod input;
pub mod pg;
pub mod plan;
pub mod policy;
pub mod store;

pub use cascade::{import_batch, run_cascade, CascadeSummary, EntityCounts, ImportError};
pub use config::{load_env_for_mode, ImportConfig};
pub use input::{read_batch, read_batch_file, ImportBatch, ImportRecord, ImportRow};
pub use store::{CascadeStore, MemoryDatabase, MemoryStore, NaturalKey};

pub const CRATE_NAME: &str = "ari-import";

#[derive(Debug, Clone, Serialize)]
pub struct DryRunReport {
    pub mode: String,
    pub input: String,
    pub rows: usize,
    pub valid: usize,
    pub invalid: usize,
    pub would_process: usize,
    pub unique_ids: BTreeMap<&'static str, usize>,
    /// Outcome of the same batch against an empty in-memory store.
    pub simulated: CascadeSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub mode: String,
    pub input: String,
    pub rows: usize,
    pub valid: usize,
    pub invalid: usize,
    #[serde(flatten)]
    pub summary: CascadeSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RunReport {
    DryRun(DryRunReport),
    Import(ImportReport),
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub async fn dry_run(config: &ImportConfig, batch: &ImportBatch) -> Result<DryRunReport> {
    let simulated = run_cascade(&mut MemoryDatabase::new().begin(), &batch.records).await?;
    Ok(DryRunReport {
        mode: config.mode.clone(),
        input: config.input.display().to_string(),
        rows: batch.rows,
        valid: batch.valid(),
        invalid: batch.invalid,
        would_process: batch.records.len(),
        unique_ids: plan::unique_id_counts(&batch.records),
        simulated,
    })
}

/// Read, validate and import (or simulate) one candidate file.
pub async fn run_import(config: &ImportConfig) -> Result<RunReport> {
    let mut batch = read_batch_file(&config.input)?;
    batch.truncate(config.limit);
    info!(
        input = %config.input.display(),
        rows = batch.rows,
        valid = batch.valid(),
        invalid = batch.invalid,
        selected = batch.records.len(),
        "candidate file read"
    );

    if config.dry_run {
        return Ok(RunReport::DryRun(dry_run(config, &batch).await?));
    }

    let pool = pg::connect(config.database_url()?).await?;
    if config.migrate {
        pg::migrate(&pool).await?;
    }
    let store = pg::PgStore::begin(&pool).await?;
    let summary = import_batch(store, &batch.records).await?;
    pool.close().await;

    Ok(RunReport::Import(ImportReport {
        mode: config.mode.clone(),
        input: config.input.display().to_string(),
        rows: batch.rows,
        valid: batch.valid(),
        invalid: batch.invalid,
        summary,
    }))
}
