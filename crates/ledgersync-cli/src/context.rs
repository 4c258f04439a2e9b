use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::{debug, info};

use ledgersync_core::auth::{resolve_token, TokenSource};
use ledgersync_core::cache::FileCacheStore;
use ledgersync_core::sync::Subscription;
use ledgersync_core::{Config, SyncManager};

/// Load the config file and apply environment overrides.
pub fn load_config() -> Result<Config> {
    let mut config = Config::load()?;
    config.apply_env();
    Ok(config)
}

pub fn resolve_cache_dir(data_dir: Option<&Path>) -> Result<PathBuf> {
    match data_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => {
            let config = load_config()?;
            config.validate()?;
            config.cache_dir()
        }
    }
}

/// Everything a ledger command needs, wired together.
pub struct Context {
    pub config: Config,
    pub manager: Arc<SyncManager>,
    pub store: Arc<FileCacheStore>,
    pub token_source: Option<TokenSource>,
    _status_printer: Subscription,
}

impl Context {
    pub fn build(data_dir: Option<&Path>, offline: bool) -> Result<Self> {
        let config = load_config()?;
        config.validate()?;

        let cache_dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => config.cache_dir()?,
        };
        let store = Arc::new(FileCacheStore::new(cache_dir)?);

        let token = if offline {
            info!("Offline flag set - ignoring any write token");
            None
        } else {
            resolve_token(&config)
        };
        let token_source = token.as_ref().map(|(_, source)| *source);

        let mut client = config
            .remote_client()
            .context("Failed to create repository client")?;
        if let Some((token, _)) = token {
            client.set_token(token);
        }
        debug!(
            owner = %config.owner,
            repo = %config.repo,
            cache_dir = %store.cache_dir().display(),
            "Context ready"
        );

        let manager = Arc::new(SyncManager::new(
            config.sync_options(token_source.is_some()),
            Arc::new(client),
            store.clone(),
        ));
        let status_printer = manager.on_status_change(|status, message| {
            eprintln!("[{}] {}", status, message);
        });

        Ok(Self {
            config,
            manager,
            store,
            token_source,
            _status_printer: status_printer,
        })
    }
}
