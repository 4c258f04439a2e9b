//! Application configuration management.
//!
//! This module handles loading and saving the configuration: which
//! repository holds the ledger blob, the blob path, and sync timings.
//!
//! Configuration is stored at `~/.config/ledgersync/config.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::remote::github::{DEFAULT_API_BASE_URL, DEFAULT_RAW_BASE_URL};
use crate::remote::{BlobLocation, GitHubBlobClient, RemoteError};
use crate::sync::SyncOptions;

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "ledgersync";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_OWNER: &str = "LEDGERSYNC_OWNER";
pub const ENV_REPO: &str = "LEDGERSYNC_REPO";
pub const ENV_BRANCH: &str = "LEDGERSYNC_BRANCH";
pub const ENV_TOKEN: &str = "LEDGERSYNC_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Path of the ledger blob inside the repository.
    pub data_file: String,
    pub sync_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub api_base_url: String,
    pub raw_base_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: String::new(),
            repo: String::new(),
            branch: "main".to_string(),
            data_file: "data/gastos.json".to_string(),
            sync_interval_secs: 30,
            request_timeout_secs: 30,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            raw_base_url: DEFAULT_RAW_BASE_URL.to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Local cache directory, one per repository.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir
            .join(APP_NAME)
            .join(format!("{}_{}", self.owner, self.repo)))
    }

    /// Apply `LEDGERSYNC_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from any variable source. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(owner) = get(ENV_OWNER) {
            self.owner = owner;
        }
        if let Some(repo) = get(ENV_REPO) {
            self.repo = repo;
        }
        if let Some(branch) = get(ENV_BRANCH) {
            self.branch = branch;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            bail!("Repository owner is not configured (run `ledgersync init` or set {})", ENV_OWNER);
        }
        if self.repo.trim().is_empty() {
            bail!("Repository name is not configured (run `ledgersync init` or set {})", ENV_REPO);
        }
        if self.branch.trim().is_empty() {
            bail!("Branch must not be empty");
        }
        if self.data_file.trim().is_empty() {
            bail!("Data file path must not be empty");
        }
        if self.request_timeout_secs == 0 {
            bail!("Request timeout must be at least one second");
        }
        Ok(())
    }

    pub fn location(&self) -> BlobLocation {
        BlobLocation::new(&self.owner, &self.repo, &self.branch)
    }

    /// Build a remote client for the configured endpoints.
    pub fn remote_client(&self) -> Result<GitHubBlobClient, RemoteError> {
        GitHubBlobClient::with_endpoints(self.location(), &self.api_base_url, &self.raw_base_url)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs.max(1))
    }

    pub fn sync_options(&self, write_enabled: bool) -> SyncOptions {
        SyncOptions::new(&self.data_file, &self.branch)
            .with_write_enabled(write_enabled)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
    }
}
