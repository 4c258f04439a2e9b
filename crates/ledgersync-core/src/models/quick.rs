use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entry::{derive_period, EntryId, Identified, LedgerEntry};
use super::lenient;

/// Origin tag stamped on expenses synthesized from a quick entry.
pub const QUICK_ENTRY_ORIGIN: &str = "mobile";

/// A lightweight expense intent, usually captured from a phone.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QuickEntry {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: EntryId,
    #[serde(rename = "descricao", default, deserialize_with = "lenient::text")]
    pub description: String,
    #[serde(rename = "valor", default, deserialize_with = "lenient::amount")]
    pub amount: f64,
    #[serde(rename = "categoria", default, deserialize_with = "lenient::text")]
    pub category: String,
    #[serde(rename = "data", default, deserialize_with = "lenient::text")]
    pub date: String,
    #[serde(
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl QuickEntry {
    pub fn new(
        description: impl Into<String>,
        amount: f64,
        category: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            amount,
            category: category.into(),
            date: date.into(),
            ..Self::default()
        }
    }

    /// Build the paid expense recorded alongside this quick entry.
    pub fn to_expense(&self) -> LedgerEntry {
        let period = derive_period(&self.date);
        LedgerEntry {
            id: self.id,
            description: self.description.clone(),
            amount: self.amount,
            category: self.category.clone(),
            due_date: Some(self.date.clone()),
            payment_date: Some(self.date.clone()),
            paid: true,
            month: period.map(|(month, _)| month),
            year: period.map(|(_, year)| year),
            timestamp: self.timestamp.clone(),
            origin: Some(QUICK_ENTRY_ORIGIN.to_string()),
            extra: Map::new(),
        }
    }
}

impl Identified for QuickEntry {
    fn id(&self) -> EntryId {
        self.id
    }

    fn set_id(&mut self, id: EntryId) {
        self.id = id;
    }
}
