use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::dataset::{DatasetKind, EntryKind};
use super::entry::{EntryId, LedgerEntry};
use super::lenient;
use super::quick::QuickEntry;

/// Budget limits keyed by period/category. The structure of each value is
/// owned by the UI, so it is kept as raw JSON.
pub type Budgets = BTreeMap<String, Value>;

/// Carry-over balance keyed by period.
pub type PriorBalances = BTreeMap<String, f64>;

/// Top-level blob keys that are rewritten on every push or export. They
/// are never carried over as unknown content.
pub const TRANSIENT_KEYS: [&str; 4] = ["lastSync", "lastUpdate", "backupDate", "version"];

/// Everything the ledger keeps locally.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerCache {
    #[serde(rename = "receitas", default, deserialize_with = "lenient::entries")]
    pub incomes: Vec<LedgerEntry>,
    #[serde(rename = "despesas", default, deserialize_with = "lenient::entries")]
    pub expenses: Vec<LedgerEntry>,
    #[serde(rename = "orcamentos", default, deserialize_with = "lenient::nullable")]
    pub budgets: Budgets,
    #[serde(rename = "saldosAnteriores", default, deserialize_with = "lenient::balances")]
    pub prior_balances: PriorBalances,
    #[serde(rename = "gastosRapidos", default, deserialize_with = "lenient::entries")]
    pub quick_entries: Vec<QuickEntry>,
    /// When the cache was last reconciled with the remote blob.
    #[serde(
        rename = "lastSync",
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_sync: Option<DateTime<Utc>>,
    /// Top-level blob keys written by other clients, pushed back unchanged.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LedgerCache {
    pub fn entries(&self, kind: EntryKind) -> &[LedgerEntry] {
        match kind {
            EntryKind::Incomes => &self.incomes,
            EntryKind::Expenses => &self.expenses,
        }
    }

    /// Replace every dataset present in the patch. Returns what was replaced.
    pub fn apply(&mut self, patch: CachePatch) -> Vec<DatasetKind> {
        let replaced = patch.datasets();
        if let Some(incomes) = patch.incomes {
            self.incomes = incomes;
        }
        if let Some(expenses) = patch.expenses {
            self.expenses = expenses;
        }
        if let Some(budgets) = patch.budgets {
            self.budgets = budgets;
        }
        if let Some(prior_balances) = patch.prior_balances {
            self.prior_balances = prior_balances;
        }
        if let Some(quick_entries) = patch.quick_entries {
            self.quick_entries = quick_entries;
        }
        for (key, value) in patch.extra {
            if !is_transient(&key) {
                self.extra.insert(key, value);
            }
        }
        replaced
    }

    /// Drop transient keys that a deserialized document may have captured
    /// as unknown content.
    pub fn strip_transient(&mut self) {
        self.extra.retain(|key, _| !is_transient(key));
    }

    /// Largest identifier in any list dataset, or zero when empty.
    pub fn max_entry_id(&self) -> EntryId {
        self.incomes
            .iter()
            .chain(self.expenses.iter())
            .map(|e| e.id)
            .chain(self.quick_entries.iter().map(|q| q.id))
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self, kind: DatasetKind) -> usize {
        match kind {
            DatasetKind::Incomes => self.incomes.len(),
            DatasetKind::Expenses => self.expenses.len(),
            DatasetKind::Budgets => self.budgets.len(),
            DatasetKind::PriorBalances => self.prior_balances.len(),
            DatasetKind::QuickEntries => self.quick_entries.len(),
        }
    }
}

/// A partial update: each dataset that is `Some` replaces the local one
/// wholesale, datasets that are `None` are left alone.
///
/// Deserializing a remote blob into a `CachePatch` gives exactly the
/// field-level replacement used when pulling.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CachePatch {
    #[serde(
        rename = "receitas",
        default,
        deserialize_with = "lenient::optional_entries",
        skip_serializing_if = "Option::is_none"
    )]
    pub incomes: Option<Vec<LedgerEntry>>,
    #[serde(
        rename = "despesas",
        default,
        deserialize_with = "lenient::optional_entries",
        skip_serializing_if = "Option::is_none"
    )]
    pub expenses: Option<Vec<LedgerEntry>>,
    #[serde(rename = "orcamentos", default, skip_serializing_if = "Option::is_none")]
    pub budgets: Option<Budgets>,
    #[serde(
        rename = "saldosAnteriores",
        default,
        deserialize_with = "lenient::optional_balances",
        skip_serializing_if = "Option::is_none"
    )]
    pub prior_balances: Option<PriorBalances>,
    #[serde(
        rename = "gastosRapidos",
        default,
        deserialize_with = "lenient::optional_entries",
        skip_serializing_if = "Option::is_none"
    )]
    pub quick_entries: Option<Vec<QuickEntry>>,
    /// Unknown top-level keys. Each one replaces the cached value of the
    /// same name; transient keys are ignored on apply.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CachePatch {
    /// A patch carrying every dataset of `cache`.
    pub fn full(cache: &LedgerCache) -> Self {
        Self {
            incomes: Some(cache.incomes.clone()),
            expenses: Some(cache.expenses.clone()),
            budgets: Some(cache.budgets.clone()),
            prior_balances: Some(cache.prior_balances.clone()),
            quick_entries: Some(cache.quick_entries.clone()),
            extra: cache.extra.clone(),
        }
    }

    pub fn entries(kind: EntryKind, entries: Vec<LedgerEntry>) -> Self {
        match kind {
            EntryKind::Incomes => Self {
                incomes: Some(entries),
                ..Self::default()
            },
            EntryKind::Expenses => Self {
                expenses: Some(entries),
                ..Self::default()
            },
        }
    }

    pub fn datasets(&self) -> Vec<DatasetKind> {
        let mut kinds = Vec::new();
        if self.incomes.is_some() {
            kinds.push(DatasetKind::Incomes);
        }
        if self.expenses.is_some() {
            kinds.push(DatasetKind::Expenses);
        }
        if self.budgets.is_some() {
            kinds.push(DatasetKind::Budgets);
        }
        if self.prior_balances.is_some() {
            kinds.push(DatasetKind::PriorBalances);
        }
        if self.quick_entries.is_some() {
            kinds.push(DatasetKind::QuickEntries);
        }
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.datasets().is_empty()
    }

    /// The first amount in the patch that is not a finite number. JSON has
    /// no NaN or infinity, so such a value could not be written back.
    pub fn non_finite_amount(&self) -> Option<(DatasetKind, f64)> {
        let entries = [
            (DatasetKind::Incomes, self.incomes.as_deref()),
            (DatasetKind::Expenses, self.expenses.as_deref()),
        ];
        for (kind, list) in entries {
            if let Some(entry) = list.unwrap_or_default().iter().find(|e| !e.amount.is_finite()) {
                return Some((kind, entry.amount));
            }
        }
        if let Some(quick) = self
            .quick_entries
            .iter()
            .flatten()
            .find(|q| !q.amount.is_finite())
        {
            return Some((DatasetKind::QuickEntries, quick.amount));
        }
        self.prior_balances
            .iter()
            .flat_map(|balances| balances.values())
            .find(|b| !b.is_finite())
            .map(|b| (DatasetKind::PriorBalances, *b))
    }
}

fn is_transient(key: &str) -> bool {
    TRANSIENT_KEYS.contains(&key)
}

/// Older clients initialise `lastSync` to the string "0"; anything that is
/// not an RFC 3339 timestamp reads as "never synced".
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    })
}
