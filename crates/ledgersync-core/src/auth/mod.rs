//! Write-credential management.
//!
//! This module provides:
//! - `CredentialStore`: the repository token in the OS keychain via keyring
//! - `resolve_token`: picks the token from the environment or the keychain
//!
//! Without a token the ledger still works, saving locally only.

pub mod credentials;

pub use credentials::{resolve_token, CredentialStore, TokenSource};
