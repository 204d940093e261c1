use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

pub const DEFAULT_MODE: &str = "development";

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub mode: String,
    pub input: PathBuf,
    pub database_url: Option<String>,
    pub limit: Option<usize>,
    pub dry_run: bool,
    pub migrate: bool,
}

impl ImportConfig {
    /// Reads `DATABASE_URL`; call after [`load_env_for_mode`].
    pub fn from_env(mode: impl Into<String>, input: impl Into<PathBuf>) -> Self {
        Self {
            mode: mode.into(),
            input: input.into(),
            database_url: std::env::var("DATABASE_URL").ok(),
            limit: None,
            dry_run: false,
            migrate: false,
        }
    }

    /// Only a live import needs a connection string.
    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL env var missing")
    }
}

/// Load `.env.<mode>` then `.env` from `dir`. Variables already set win.
pub fn load_env_for_mode(dir: &Path, mode: &str) -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    for name in [format!(".env.{mode}"), ".env".to_string()] {
        let path = dir.join(name);
        if dotenvy::from_path(&path).is_ok() {
            debug!(path = %path.display(), "loaded env file");
            loaded.push(path);
        }
    }
    loaded
}
