use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

use crate::config::{Config, APP_NAME, ENV_TOKEN};

const SERVICE_NAME: &str = APP_NAME;

/// Where the write token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Environment,
    Keychain,
}

/// Repository tokens in the OS keychain, one per `owner/repo`.
pub struct CredentialStore;

impl CredentialStore {
    fn account(config: &Config) -> String {
        format!("{}/{}", config.owner, config.repo)
    }

    fn entry(config: &Config) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &Self::account(config)).context("Failed to create keyring entry")
    }

    /// Store the write token in the OS keychain
    pub fn store(config: &Config, token: &str) -> Result<()> {
        Self::entry(config)?
            .set_password(token)
            .context("Failed to store token in keychain")?;
        Ok(())
    }

    /// Retrieve the write token from the OS keychain
    pub fn get_token(config: &Config) -> Result<String> {
        Self::entry(config)?
            .get_password()
            .context("Failed to retrieve token from keychain")
    }

    /// Delete the stored token
    pub fn delete(config: &Config) -> Result<()> {
        Self::entry(config)?
            .delete_credential()
            .context("Failed to delete token from keychain")?;
        Ok(())
    }

    pub fn has_token(config: &Config) -> bool {
        Self::get_token(config).is_ok()
    }
}

/// Find the write token: `LEDGERSYNC_TOKEN` first, then the keychain.
/// `None` means local-only mode, which is not an error.
pub fn resolve_token(config: &Config) -> Option<(String, TokenSource)> {
    resolve_with(
        || std::env::var(ENV_TOKEN).ok(),
        || CredentialStore::get_token(config).ok(),
    )
}

fn resolve_with<E, K>(from_env: E, from_keychain: K) -> Option<(String, TokenSource)>
where
    E: FnOnce() -> Option<String>,
    K: FnOnce() -> Option<String>,
{
    let usable = |token: String| {
        let token = token.trim().to_string();
        (!token.is_empty()).then_some(token)
    };

    if let Some(token) = from_env().and_then(usable) {
        debug!("Using write token from environment");
        return Some((token, TokenSource::Environment));
    }
    if let Some(token) = from_keychain().and_then(usable) {
        debug!("Using write token from keychain");
        return Some((token, TokenSource::Keychain));
    }
    debug!("No write token available");
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_wins() {
        let resolved = resolve_with(|| Some("env".into()), || Some("keychain".into()));
        assert_eq!(resolved, Some(("env".to_string(), TokenSource::Environment)));
    }

    #[test]
    fn test_falls_back_to_keychain() {
        let resolved = resolve_with(|| Some("   ".into()), || Some(" kc \n".into()));
        assert_eq!(resolved, Some(("kc".to_string(), TokenSource::Keychain)));
    }

    #[test]
    fn test_no_token_is_none() {
        assert_eq!(resolve_with(|| None, || None), None);
    }

    #[test]
    fn test_account_name() {
        let config = Config {
            owner: "smarques".into(),
            repo: "financeiro".into(),
            ..Config::default()
        };
        assert_eq!(CredentialStore::account(&config), "smarques/financeiro");
    }
}
