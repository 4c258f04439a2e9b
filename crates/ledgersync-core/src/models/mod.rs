//! Data models for the ledger cache and its remote blob.
//!
//! This module contains the data structures that make up the ledger:
//!
//! - `LedgerEntry`: incomes and expenses
//! - `QuickEntry`: lightweight expense intents logged from mobile
//! - `LedgerCache`: the aggregate of every dataset plus the last-sync marker
//! - `CachePatch`: a partial update that replaces whole datasets
//! - `DatasetKind`, `EntryKind`: closed enumerations of the datasets
//! - `lenient`: tolerant field readers shared by the blob types
//!
//! Field names on the wire stay compatible with the blob already stored
//! in the remote repository (`receitas`, `despesas`, ...).

pub mod cache;
pub mod dataset;
pub mod entry;
pub mod lenient;
pub mod quick;

pub use cache::{Budgets, CachePatch, LedgerCache, PriorBalances, TRANSIENT_KEYS};
pub use dataset::{DatasetKind, EntryKind};
pub use entry::{merge_fields, EntryId, FieldError, Identified, LedgerEntry};
pub use quick::{QuickEntry, QUICK_ENTRY_ORIGIN};
