use std::fmt;

use serde::{Deserialize, Serialize};

/// The five datasets that make up a ledger cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatasetKind {
    Incomes,
    Expenses,
    Budgets,
    PriorBalances,
    QuickEntries,
}

impl DatasetKind {
    pub const ALL: [DatasetKind; 5] = [
        DatasetKind::Incomes,
        DatasetKind::Expenses,
        DatasetKind::Budgets,
        DatasetKind::PriorBalances,
        DatasetKind::QuickEntries,
    ];

    /// Top-level key of this dataset inside the remote blob and backups.
    pub fn blob_key(&self) -> &'static str {
        match self {
            DatasetKind::Incomes => "receitas",
            DatasetKind::Expenses => "despesas",
            DatasetKind::Budgets => "orcamentos",
            DatasetKind::PriorBalances => "saldosAnteriores",
            DatasetKind::QuickEntries => "gastosRapidos",
        }
    }

    /// True for the datasets stored as lists of entries.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            DatasetKind::Incomes | DatasetKind::Expenses | DatasetKind::QuickEntries
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DatasetKind::Incomes => "incomes",
            DatasetKind::Expenses => "expenses",
            DatasetKind::Budgets => "budgets",
            DatasetKind::PriorBalances => "prior balances",
            DatasetKind::QuickEntries => "quick entries",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Datasets that hold full ledger entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Incomes,
    Expenses,
}

impl EntryKind {
    pub fn dataset(&self) -> DatasetKind {
        match self {
            EntryKind::Incomes => DatasetKind::Incomes,
            EntryKind::Expenses => DatasetKind::Expenses,
        }
    }
}

impl From<EntryKind> for DatasetKind {
    fn from(kind: EntryKind) -> Self {
        kind.dataset()
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.dataset().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_keys_are_distinct() {
        let mut keys: Vec<_> = DatasetKind::ALL.iter().map(|k| k.blob_key()).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), DatasetKind::ALL.len());
    }

    #[test]
    fn test_entry_kind_maps_to_dataset() {
        assert_eq!(DatasetKind::from(EntryKind::Incomes), DatasetKind::Incomes);
        assert_eq!(EntryKind::Expenses.dataset().blob_key(), "despesas");
        assert_eq!(EntryKind::Expenses.to_string(), "expenses");
    }
}
