// ⚙️ Configuration - TOML file with defaults for every key
//
//   database_path = "meets.db"
//   results_dir = "results"
//   region_codes_path = "region_codes.json"
//   busy_timeout_ms = 250
//   log_level = "info"
//   log_json = false
//
//   [retry]
//   max_attempts = 5
//   base_delay_ms = 50
//   max_delay_ms = 2000

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::regions::RegionDirectory;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 5,
            base_delay_ms: 50,
            max_delay_ms: 2000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub database_path: PathBuf,
    /// Managed archive directory, one sub-directory per region
    pub results_dir: PathBuf,
    pub region_codes_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub retry: RetryConfig,
    pub log_level: String,
    pub log_json: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            database_path: PathBuf::from("meets.db"),
            results_dir: PathBuf::from("results"),
            region_codes_path: None,
            busy_timeout_ms: 250,
            retry: RetryConfig::default(),
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl IngestConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("Failed to parse configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load `path` if given, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.policy()
    }

    /// Region directory from `region_codes_path`, empty when unset.
    pub fn region_directory(&self) -> Result<RegionDirectory> {
        match &self.region_codes_path {
            Some(path) => Ok(RegionDirectory::load(path)?),
            None => {
                tracing::warn!("No region codes file configured, all region codes will resolve to empty");
                Ok(RegionDirectory::empty())
            }
        }
    }
}
