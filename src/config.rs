use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{NextupError, Result};

const WEEK_SECS: i64 = 7 * 24 * 60 * 60;

/// Engine configuration. Category weights are not configuration; they live in
/// the store as [`crate::types::Settings`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `None` selects a SQLite file in the platform data directory.
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub enrichment_timeout_ms: u64,
    pub metadata_cache_ttl_secs: i64,
    pub max_connections: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            run_migrations: true,
            enrichment_timeout_ms: 1500,
            metadata_cache_ttl_secs: WEEK_SECS,
            max_connections: 10,
        }
    }
}

impl EngineConfig {
    /// `<config_dir>/config.toml` for this application.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "nextup", "nextup").map(|d| d.config_dir().join("config.toml"))
    }

    /// Parses TOML; missing keys keep their defaults.
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| NextupError::Config(e.to_string()))
    }

    /// Reads `path` (or the default location) when it exists, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);
        let mut cfg = match path {
            Some(p) if p.exists() => {
                let raw = std::fs::read_to_string(&p)
                    .map_err(|e| NextupError::Config(format!("reading {}: {e}", p.display())))?;
                debug!(path = %p.display(), "loaded config file");
                Self::from_toml(&raw)?
            }
            _ => Self::default(),
        };
        cfg.apply_env(|key| std::env::var(key).ok())?;
        Ok(cfg)
    }

    /// Applies `NEXTUP_*` overrides looked up through `var`.
    pub fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = var("NEXTUP_DATABASE_URL").filter(|s| !s.trim().is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(v) = var("NEXTUP_ENRICHMENT_TIMEOUT_MS") {
            self.enrichment_timeout_ms = parse_env("NEXTUP_ENRICHMENT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("NEXTUP_METADATA_TTL_SECS") {
            self.metadata_cache_ttl_secs = parse_env("NEXTUP_METADATA_TTL_SECS", &v)?;
        }
        Ok(())
    }

    pub fn enrichment_timeout(&self) -> Duration { Duration::from_millis(self.enrichment_timeout_ms) }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| NextupError::Config(format!("{key}: not a number: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = EngineConfig::from_toml("enrichment_timeout_ms = 250\n").unwrap();
        assert_eq!(cfg.enrichment_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.max_connections, 10);
        assert!(cfg.run_migrations);
        assert_eq!(cfg.metadata_cache_ttl_secs, WEEK_SECS);
    }

    #[test]
    fn env_overrides_file_values() {
        let env: HashMap<&str, &str> =
            [("NEXTUP_DATABASE_URL", "sqlite::memory:"), ("NEXTUP_METADATA_TTL_SECS", "60")].into_iter().collect();
        let mut cfg = EngineConfig::default();
        cfg.apply_env(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(cfg.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(cfg.metadata_cache_ttl_secs, 60);
        assert_eq!(cfg.enrichment_timeout_ms, 1500);
    }

    #[test]
    fn bad_numbers_are_config_errors() {
        let mut cfg = EngineConfig::default();
        let err = cfg
            .apply_env(|k| (k == "NEXTUP_ENRICHMENT_TIMEOUT_MS").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, NextupError::Config(_)));
        assert!(EngineConfig::from_toml("max_connections = \"ten\"").is_err());
    }

    #[test]
    fn missing_file_is_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = EngineConfig::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        cfg.database_url = None;
        cfg.enrichment_timeout_ms = 1500;
        cfg.metadata_cache_ttl_secs = WEEK_SECS;
        assert_eq!(cfg, EngineConfig::default());
    }
}
