//! Discovery pipeline: acquire both credit registers, normalize, resolve
//! intermediary authorisations, deduplicate and scope to target cities.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use ari_adapters::{
    acquire, parse_delimited, rows_to_candidates, AcquiredDataset, Catalog, HttpCatalog,
    SourceRegistry,
};
use ari_core::{geo, CandidateRecord};
use ari_storage::{HttpClientConfig, HttpFetcher, PayloadStore};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::fs;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

pub mod artifacts;
pub mod authorisation;
pub mod cities;
pub mod dedupe;
pub mod gazetteer;

use artifacts::{RunMetadata, SourceProvenance, StageCounts};
use authorisation::LicenseeAuthorisations;
use cities::City;
use gazetteer::PostcodeGazetteer;

pub const CRATE_NAME: &str = "ari-sync";

pub const DEFAULT_CATALOG_URL: &str = "https://data.gov.au/data/api/3/action/package_show";
pub const DEFAULT_RADIUS_KM: f64 = 80.0;

#[derive(Debug, Clone)]
pub struct DiscoverConfig {
    pub out_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub workspace_root: PathBuf,
    pub catalog_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub postcode_file: Option<PathBuf>,
    pub radius_km: f64,
    pub cities: Vec<&'static City>,
    pub as_of: NaiveDate,
}

impl DiscoverConfig {
    pub fn from_env() -> Self {
        Self {
            out_dir: std::env::var("ARI_OUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/discover")),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./artifacts")),
            workspace_root: PathBuf::from("."),
            catalog_url: std::env::var("ARI_CATALOG_URL")
                .unwrap_or_else(|_| DEFAULT_CATALOG_URL.to_string()),
            user_agent: std::env::var("ARI_USER_AGENT").unwrap_or_else(|_| "ari-bot/0.1".to_string()),
            http_timeout_secs: std::env::var("ARI_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            postcode_file: std::env::var("ARI_POSTCODE_FILE").ok().map(PathBuf::from),
            radius_km: DEFAULT_RADIUS_KM,
            cities: cities::parse_city_list(cities::DEFAULT_CITIES).unwrap_or_default(),
            as_of: Utc::now().date_naive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeoScope {
    pub cities: Vec<&'static City>,
    pub radius_km: f64,
}

/// Every intermediate set produced by one discovery pass.
#[derive(Debug, Clone, Default)]
pub struct ProcessedCandidates {
    pub raw: Vec<CandidateRecord>,
    pub deduplicated: Vec<CandidateRecord>,
    pub intermediary: Vec<CandidateRecord>,
    pub confirmed: Vec<CandidateRecord>,
    pub per_city: BTreeMap<String, Vec<CandidateRecord>>,
    pub counts: StageCounts,
    pub unresolved_authorisation: usize,
}

/// Pure in-memory stage: currency → dedupe → authorisation → geo scope.
pub fn process_candidates(raw: Vec<CandidateRecord>, scope: &GeoScope, as_of: NaiveDate) -> ProcessedCandidates {
    let mut counts = StageCounts {
        raw_candidates: raw.len(),
        ..Default::default()
    };

    let current: Vec<CandidateRecord> = raw.iter().filter(|r| r.is_current_on(as_of)).cloned().collect();
    // A lapsed licence authorises nobody.
    let licensees = LicenseeAuthorisations::from_records(&current);
    counts.current = current.len();
    counts.not_current = raw.len() - current.len();

    let deduplicated = dedupe::deduplicate(current);
    counts.deduplicated = deduplicated.len();

    let mut unresolved_authorisation = 0;
    let intermediary: Vec<CandidateRecord> = deduplicated
        .iter()
        .filter(|record| {
            let outcome = authorisation::resolve(record, &licensees);
            if outcome.is_unresolved() {
                unresolved_authorisation += 1;
            }
            outcome.is_intermediary()
        })
        .cloned()
        .collect();
    counts.intermediary = intermediary.len();

    let mut per_city: BTreeMap<String, Vec<CandidateRecord>> = scope
        .cities
        .iter()
        .map(|c| (c.slug.to_string(), Vec::new()))
        .collect();
    let mut confirmed = Vec::new();
    for record in &intermediary {
        let point = record.coordinates();
        if point.is_none() {
            counts.without_coordinates += 1;
            continue;
        }
        let mut nearest: Option<(&City, f64)> = None;
        for &city in &scope.cities {
            let Some(distance) = geo::within_radius(point, city.centre, scope.radius_km) else {
                continue;
            };
            let mut scoped = record.clone();
            scoped.distance_km = Some(distance);
            scoped.city = Some(city.slug.to_string());
            per_city.entry(city.slug.to_string()).or_default().push(scoped);
            if nearest.map_or(true, |(_, best)| distance < best) {
                nearest = Some((city, distance));
            }
        }
        if let Some((city, distance)) = nearest {
            let mut scoped = record.clone();
            scoped.distance_km = Some(distance);
            scoped.city = Some(city.slug.to_string());
            confirmed.push(scoped);
        }
    }
    counts.confirmed = confirmed.len();

    ProcessedCandidates {
        raw,
        deduplicated,
        intermediary,
        confirmed,
        per_city,
        counts,
        unresolved_authorisation,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverSummary {
    pub run_id: Uuid,
    pub out_dir: String,
    pub counts: StageCounts,
    pub per_city: BTreeMap<String, usize>,
    pub unresolved_authorisation: usize,
    pub metadata_path: String,
}

pub struct DiscoverPipeline {
    config: DiscoverConfig,
    http: Arc<HttpFetcher>,
    payloads: PayloadStore,
    catalog: Option<Arc<dyn Catalog>>,
}

impl DiscoverPipeline {
    pub fn new(config: DiscoverConfig) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
            ..Default::default()
        })?;
        let payloads = PayloadStore::new(config.artifacts_dir.clone());
        Ok(Self {
            config,
            http: Arc::new(http),
            payloads,
            catalog: None,
        })
    }

    /// Replace the HTTP catalog, e.g. with local fixtures.
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub async fn run_once(&self) -> Result<DiscoverSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let registry = SourceRegistry::load(&self.config.workspace_root)?;
        let raw_dir = self.config.out_dir.join("raw");
        fs::create_dir_all(&raw_dir)
            .await
            .with_context(|| format!("creating {}", raw_dir.display()))?;

        info!(%run_id, cities = self.config.cities.len(), radius_km = self.config.radius_km, "discovery run started");
        let datasets = self.acquire_all(run_id, &registry).await?;

        let mut raw = Vec::new();
        let mut sources = Vec::new();
        let mut raw_rows = 0usize;
        for dataset in &datasets {
            let stored_path = self.store_raw(dataset).await?;
            let text = dataset.text();
            let rows = parse_delimited(&text, dataset.source.delimiter, dataset.source.quoted)
                .with_context(|| format!("parsing {}", dataset.resource.url))?;
            let candidates = rows_to_candidates(&dataset.source, &rows, &dataset.resource.url);
            info!(
                source_id = %dataset.source.source_id,
                rows = rows.len(),
                candidates = candidates.len(),
                "register parsed"
            );
            if candidates.is_empty() {
                warn!(source_id = %dataset.source.source_id, "register produced no candidates");
            }
            raw_rows += rows.len();
            sources.push(SourceProvenance {
                source_id: dataset.source.source_id.clone(),
                package_id: dataset.source.package_id.clone(),
                resource_id: dataset.resource.id.clone(),
                resource_url: dataset.resource.url.clone(),
                last_modified: dataset.resource.last_modified.clone(),
                fetched_at: dataset.fetched_at,
                sha256: PayloadStore::sha256_hex(&dataset.body),
                bytes: dataset.body.len(),
                stored_path,
                rows: rows.len(),
                candidates: candidates.len(),
            });
            raw.extend(candidates);
        }

        let backfilled = match &self.config.postcode_file {
            Some(path) => PostcodeGazetteer::load(path)?.backfill(&mut raw),
            None => 0,
        };

        let scope = GeoScope {
            cities: self.config.cities.clone(),
            radius_km: self.config.radius_km,
        };
        let mut processed = process_candidates(raw, &scope, self.config.as_of);
        processed.counts.raw_rows = raw_rows;
        processed.counts.coordinates_backfilled = backfilled;

        let files = self.write_candidate_files(&processed)?;
        let per_city: BTreeMap<String, usize> = processed
            .per_city
            .iter()
            .map(|(slug, records)| (slug.clone(), records.len()))
            .collect();

        let metadata = RunMetadata {
            run_id,
            started_at,
            finished_at: Utc::now(),
            as_of: self.config.as_of,
            radius_km: self.config.radius_km,
            cities: self.config.cities.iter().map(|c| c.slug.to_string()).collect(),
            counts: processed.counts.clone(),
            per_city: per_city.clone(),
            unresolved_authorisation: processed.unresolved_authorisation,
            sources,
            files,
        };
        let metadata_path = self.config.out_dir.join(artifacts::RUN_METADATA);
        artifacts::write_run_metadata(&metadata_path, &metadata)?;
        info!(%run_id, confirmed = processed.counts.confirmed, "discovery run finished");

        Ok(DiscoverSummary {
            run_id,
            out_dir: self.config.out_dir.display().to_string(),
            counts: processed.counts,
            per_city,
            unresolved_authorisation: processed.unresolved_authorisation,
            metadata_path: metadata_path.display().to_string(),
        })
    }

    /// Fetch every enabled register concurrently. Any failure aborts the run.
    async fn acquire_all(&self, run_id: Uuid, registry: &SourceRegistry) -> Result<Vec<AcquiredDataset>> {
        let catalog: Arc<dyn Catalog> = match &self.catalog {
            Some(catalog) => Arc::clone(catalog),
            None => Arc::new(HttpCatalog::new(
                Arc::clone(&self.http),
                self.config.catalog_url.clone(),
                run_id,
            )),
        };
        let mut tasks = JoinSet::new();
        let enabled: Vec<_> = registry.enabled().cloned().collect();
        for (idx, source) in enabled.iter().cloned().enumerate() {
            let catalog = Arc::clone(&catalog);
            tasks.spawn(async move { (idx, acquire(catalog.as_ref(), &source).await) });
        }

        let mut slots: Vec<Option<AcquiredDataset>> = vec![None; enabled.len()];
        while let Some(joined) = tasks.join_next().await {
            let (idx, result) = joined.context("acquisition task panicked")?;
            let dataset = result.with_context(|| format!("acquiring {}", enabled[idx].source_id))?;
            slots[idx] = Some(dataset);
        }
        Ok(slots.into_iter().flatten().collect())
    }

    /// Keep a hash-addressed copy and a plain copy next to the run outputs.
    async fn store_raw(&self, dataset: &AcquiredDataset) -> Result<String> {
        let ext = match dataset.source.delimiter {
            ari_adapters::Delimiter::Tab => "tsv",
            ari_adapters::Delimiter::Comma => "csv",
        };
        let plain_path = self
            .config
            .out_dir
            .join("raw")
            .join(format!("{}.{ext}", dataset.source.source_id));
        let (stored, ()) = tokio::try_join!(
            self.payloads
                .put(dataset.fetched_at, &dataset.source.source_id, ext, &dataset.body),
            async {
                fs::write(&plain_path, &dataset.body)
                    .await
                    .with_context(|| format!("writing {}", plain_path.display()))
            }
        )?;
        Ok(stored.absolute_path.display().to_string())
    }

    fn write_candidate_files(&self, processed: &ProcessedCandidates) -> Result<BTreeMap<String, String>> {
        let out = &self.config.out_dir;
        let mut files = BTreeMap::new();
        let stages = [
            ("raw", artifacts::RAW_CANDIDATES, &processed.raw),
            ("deduplicated", artifacts::DEDUPED_CANDIDATES, &processed.deduplicated),
            ("intermediary", artifacts::INTERMEDIARY_CANDIDATES, &processed.intermediary),
            ("confirmed", artifacts::CONFIRMED_CANDIDATES, &processed.confirmed),
        ];
        for (stage, name, records) in stages {
            let path = out.join(name);
            artifacts::write_candidates_csv(&path, records)?;
            files.insert(stage.to_string(), artifacts::relative_name(out, &path));
        }
        for (slug, records) in &processed.per_city {
            let path = out.join(artifacts::city_file_name(slug));
            artifacts::write_candidates_csv(&path, records)?;
            files.insert(format!("city:{slug}"), artifacts::relative_name(out, &path));
        }
        Ok(files)
    }
}

pub async fn run_discover(config: DiscoverConfig) -> Result<DiscoverSummary> {
    DiscoverPipeline::new(config)?.run_once().await
}

/// Human-readable end-of-run report printed by the CLI.
pub fn render_summary(summary: &DiscoverSummary) -> String {
    let c = &summary.counts;
    let mut lines = vec![
        format!("discovery complete: run_id={}", summary.run_id),
        format!("  raw rows:               {}", c.raw_rows),
        format!("  candidates:             {}", c.raw_candidates),
        format!("  current:                {} ({} expired)", c.current, c.not_current),
        format!("  deduplicated:           {}", c.deduplicated),
        format!("  intermediary:           {}", c.intermediary),
        format!("  unresolved authorisation: {}", summary.unresolved_authorisation),
        format!("  without coordinates:    {}", c.without_coordinates),
        format!("  confirmed (combined):   {}", c.confirmed),
    ];
    for (slug, count) in &summary.per_city {
        lines.push(format!("    {slug}: {count}"));
    }
    lines.push(format!("  metadata: {}", summary.metadata_path));
    lines.join("\n")
}
