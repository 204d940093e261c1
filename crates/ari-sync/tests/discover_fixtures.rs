use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use ari_adapters::{AcquireError, Catalog, CatalogResource};
use ari_sync::artifacts::{self, read_candidates_csv, read_run_metadata};
use ari_sync::{cities, DiscoverConfig, DiscoverPipeline};
use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::tempdir;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

/// Serves the checked-in register exports instead of the live catalog.
struct FixtureCatalog {
    files: HashMap<&'static str, &'static str>,
}

impl FixtureCatalog {
    fn new() -> Self {
        Self {
            files: HashMap::from([
                ("asic-credit-licensee", "registers/licensees.tsv"),
                ("asic-credit-representative", "registers/representatives.tsv"),
            ]),
        }
    }
}

#[async_trait]
impl Catalog for FixtureCatalog {
    async fn package_resources(&self, package_id: &str) -> Result<Vec<CatalogResource>, AcquireError> {
        let file = self.files.get(package_id).ok_or_else(|| AcquireError::NoQualifyingResource {
            package_id: package_id.to_string(),
            format: "TSV".to_string(),
        })?;
        Ok(vec![CatalogResource {
            id: format!("{package_id}-2026"),
            name: Some(format!("{package_id} export")),
            description: None,
            format: Some("TSV".to_string()),
            url: fixtures_dir().join(file).display().to_string(),
            last_modified: Some("2026-10-01T00:00:00".to_string()),
            created: None,
        }])
    }

    async fn download(&self, _source_id: &str, url: &str) -> Result<Vec<u8>, AcquireError> {
        Ok(std::fs::read(url).expect("fixture file"))
    }
}

fn config(root: &std::path::Path) -> DiscoverConfig {
    DiscoverConfig {
        out_dir: root.join("out"),
        artifacts_dir: root.join("artifacts"),
        workspace_root: root.to_path_buf(),
        catalog_url: "http://unused.test".to_string(),
        user_agent: "ari-test".to_string(),
        http_timeout_secs: 5,
        postcode_file: Some(fixtures_dir().join("postcodes.csv")),
        radius_km: 80.0,
        cities: cities::parse_city_list("melbourne,sydney").unwrap(),
        as_of: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
    }
}

#[tokio::test]
async fn fixture_run_writes_every_stage() {
    let dir = tempdir().expect("tempdir");
    let pipeline = DiscoverPipeline::new(config(dir.path()))
        .unwrap()
        .with_catalog(Arc::new(FixtureCatalog::new()));

    let summary = pipeline.run_once().await.unwrap();
    let counts = &summary.counts;
    assert_eq!(counts.raw_rows, 9);
    assert_eq!(counts.raw_candidates, 9);
    assert_eq!(counts.coordinates_backfilled, 5);
    assert_eq!(counts.not_current, 2);
    assert_eq!(counts.deduplicated, 6);
    assert_eq!(counts.intermediary, 3);
    assert_eq!(counts.confirmed, 3);
    assert_eq!(summary.unresolved_authorisation, 1);
    assert_eq!(summary.per_city["melbourne"], 2);
    assert_eq!(summary.per_city["sydney"], 1);

    let out = dir.path().join("out");
    assert!(out.join("raw/credit-licensees.tsv").exists());
    assert!(out.join("raw/credit-representatives.tsv").exists());

    let confirmed = read_candidates_csv(&out.join(artifacts::CONFIRMED_CANDIDATES)).unwrap();
    let numbers: Vec<_> = confirmed.iter().map(|r| r.credential_number.as_str()).collect();
    // the representative sharing Acme's ABN displaces the licensee row
    assert_eq!(numbers, vec!["500102", "456789", "500100"]);
    assert!(confirmed.iter().all(|r| r.distance_km.is_some() && r.dedupe_key.is_some()));

    let melbourne = read_candidates_csv(&out.join(artifacts::city_file_name("melbourne"))).unwrap();
    assert!(melbourne.iter().all(|r| r.city.as_deref() == Some("melbourne")));

    let metadata = read_run_metadata(&out.join(artifacts::RUN_METADATA)).unwrap();
    assert_eq!(metadata.run_id, summary.run_id);
    assert_eq!(metadata.sources.len(), 2);
    assert_eq!(metadata.sources[0].source_id, "credit-licensees");
    assert_eq!(metadata.sources[0].rows, 4);
    assert_eq!(metadata.files["city:sydney"], "confirmed_sydney.csv");
}

#[tokio::test]
async fn missing_register_aborts_the_run() {
    let dir = tempdir().expect("tempdir");
    let mut catalog = FixtureCatalog::new();
    catalog.files.remove("asic-credit-representative");
    let pipeline = DiscoverPipeline::new(config(dir.path()))
        .unwrap()
        .with_catalog(Arc::new(catalog));

    let err = pipeline.run_once().await.unwrap_err();
    assert!(format!("{err:#}").contains("credit-representatives"));
    assert!(!dir.path().join("out").join(artifacts::RUN_METADATA).exists());
}
