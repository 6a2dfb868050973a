use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub source: SourceConfig,
    pub fetch: FetchConfig,
    pub pacing: PacingConfig,
    pub run: RunConfig,
}

/// Where the ledger and collected reviews live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub ledger_path: PathBuf,
    pub results_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("urls.csv"),
            results_path: PathBuf::from("reviews.csv"),
        }
    }
}

/// Target site and session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub ratings_path: String,
    /// JSON list of `{name, value, domain, path}` cookie records
    pub cookies_path: PathBuf,
    pub user_agents: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "https://shopee.vn".to_string(),
            ratings_path: "/api/v2/item/get_ratings".to_string(),
            cookies_path: PathBuf::from("shopee_cookies.json"),
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36".to_string(),
                "Mozilla/5.0 (iPhone; CPU iPhone OS 16_3 like Mac OS X) AppleWebKit/537.36 (KHTML, like Gecko) Version/16.3 Mobile/15E148 Safari/537.36".to_string(),
                "Mozilla/5.0 (Linux; Android 11; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Mobile Safari/537.36".to_string(),
            ],
            request_timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Pagination and per-bucket targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub page_size: u32,
    pub target_count: u32,
    pub page_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: 6,
            target_count: 15,
            page_timeout_secs: 30,
        }
    }
}

impl FetchConfig {
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }
}

/// Delays inserted between requests, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub page_delay_min_secs: f64,
    pub page_delay_max_secs: f64,
    pub item_delay_secs: f64,
    pub session_warmup_secs: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            page_delay_min_secs: 2.0,
            page_delay_max_secs: 5.0,
            item_delay_secs: 2.0,
            session_warmup_secs: 10.0,
        }
    }
}

impl PacingConfig {
    pub fn page_delay_range(&self) -> (Duration, Duration) {
        (
            Duration::from_secs_f64(self.page_delay_min_secs),
            Duration::from_secs_f64(self.page_delay_max_secs),
        )
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_secs_f64(self.item_delay_secs)
    }

    pub fn session_warmup(&self) -> Duration {
        Duration::from_secs_f64(self.session_warmup_secs)
    }
}

/// Multi-epoch run settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub max_epochs: u32,
    pub epoch_pause_secs: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_epochs: 5,
            epoch_pause_secs: 5.0,
        }
    }
}

impl RunConfig {
    pub fn epoch_pause(&self) -> Duration {
        Duration::from_secs_f64(self.epoch_pause_secs)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        info!(path = %path.display(), "Loaded configuration");

        Ok(config)
    }

    /// Reject settings the fetch loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.fetch.page_size == 0 {
            anyhow::bail!("fetch.page_size must be at least 1");
        }
        if self.fetch.target_count == 0 {
            anyhow::bail!("fetch.target_count must be at least 1");
        }

        let p = &self.pacing;
        for (name, value) in [
            ("pacing.page_delay_min_secs", p.page_delay_min_secs),
            ("pacing.page_delay_max_secs", p.page_delay_max_secs),
            ("pacing.item_delay_secs", p.item_delay_secs),
            ("pacing.session_warmup_secs", p.session_warmup_secs),
            ("run.epoch_pause_secs", self.run.epoch_pause_secs),
        ] {
            if Duration::try_from_secs_f64(value).is_err() {
                anyhow::bail!(
                    "{} must be a non-negative number of seconds in range, got {}",
                    name,
                    value
                );
            }
        }
        if p.page_delay_min_secs > p.page_delay_max_secs {
            anyhow::bail!(
                "pacing.page_delay_min_secs ({}) exceeds pacing.page_delay_max_secs ({})",
                p.page_delay_min_secs,
                p.page_delay_max_secs
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.fetch.page_size, 6);
        assert_eq!(config.fetch.target_count, 15);
        assert_eq!(config.storage.ledger_path, PathBuf::from("urls.csv"));
        assert_eq!(config.source.user_agents.len(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
storage:
  ledger_path: data/urls.csv

fetch:
  page_size: 20
  target_count: 40

pacing:
  page_delay_min_secs: 0.5
  page_delay_max_secs: 1.5
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.storage.ledger_path, PathBuf::from("data/urls.csv"));
        assert_eq!(config.storage.results_path, PathBuf::from("reviews.csv"));
        assert_eq!(config.fetch.page_size, 20);
        assert_eq!(config.fetch.page_timeout_secs, 30);
        assert_eq!(
            config.pacing.page_delay_range(),
            (Duration::from_millis(500), Duration::from_millis(1500))
        );
        assert_eq!(config.pacing.item_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.fetch.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pacing.page_delay_min_secs = 9.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pacing.item_delay_secs = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_delays_too_large_for_duration() {
        let mut config = Config::default();
        config.pacing.item_delay_secs = 1e20;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.run.epoch_pause_secs = f64::INFINITY;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pacing.session_warmup_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_rejects_huge_delay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scraper.yml");
        fs::write(&path, "pacing:\n  item_delay_secs: 1e20\n").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.yml")).unwrap();
        assert_eq!(config.run.max_epochs, 5);
    }

    #[test]
    fn test_load_rejects_invalid_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scraper.yml");
        fs::write(&path, "fetch:\n  target_count: 0\n").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
