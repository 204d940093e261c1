//! `sources.yaml`: which register datasets to pull and how to read them.

use std::path::Path;

use anyhow::{Context, Result};
use ari_core::EntityKind;
use serde::Deserialize;

use crate::tabular::Delimiter;

pub const DEFAULT_SOURCES_YAML: &str = r#"
sources:
  - source_id: credit-licensees
    display_name: ASIC Credit Licensee Dataset
    package_id: asic-credit-licensee
    entity_kind: licensee
    expected_format: TSV
    delimiter: tab
    quoted: false
    enabled: true
  - source_id: credit-representatives
    display_name: ASIC Credit Representative Dataset
    package_id: asic-credit-representative
    entity_kind: representative
    expected_format: TSV
    delimiter: tab
    quoted: false
    enabled: true
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub package_id: String,
    pub entity_kind: EntityKind,
    pub expected_format: String,
    pub delimiter: Delimiter,
    #[serde(default)]
    pub quoted: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl SourceRegistry {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let registry: SourceRegistry = serde_yaml::from_str(text).context("parsing source registry")?;
        registry.validate()?;
        Ok(registry)
    }

    /// Reads `sources.yaml` under `workspace_root`, falling back to the built-in registry.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let path = workspace_root.join("sources.yaml");
        if !path.exists() {
            return Self::from_yaml(DEFAULT_SOURCES_YAML);
        }
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("loading {}", path.display()))
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }

    /// The resolver needs exactly one licensee register to follow representative links.
    fn validate(&self) -> Result<()> {
        let licensee_sources = self
            .enabled()
            .filter(|s| s.entity_kind == EntityKind::Licensee)
            .count();
        anyhow::ensure!(
            licensee_sources == 1,
            "expected exactly one enabled licensee source, found {licensee_sources}"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_has_both_registers() {
        let registry = SourceRegistry::from_yaml(DEFAULT_SOURCES_YAML).unwrap();
        let ids: Vec<_> = registry.enabled().map(|s| s.source_id.as_str()).collect();
        assert_eq!(ids, vec!["credit-licensees", "credit-representatives"]);
        assert_eq!(registry.sources[1].delimiter, Delimiter::Tab);
        assert_eq!(registry.sources[1].entity_kind, EntityKind::Representative);
    }

    #[test]
    fn registry_without_licensee_source_is_rejected() {
        let yaml = r#"
sources:
  - source_id: reps
    display_name: Reps
    package_id: reps
    entity_kind: representative
    expected_format: CSV
    delimiter: comma
"#;
        assert!(SourceRegistry::from_yaml(yaml).is_err());
    }
}
