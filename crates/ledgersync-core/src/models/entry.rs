use chrono::{Datelike, NaiveDate};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::lenient;

/// Entry identifier: milliseconds since the epoch at creation, unless the
/// caller supplied one. Zero means "not yet assigned".
pub type EntryId = i64;

/// Anything stored in a list dataset and addressed by identifier.
pub trait Identified {
    fn id(&self) -> EntryId;
    fn set_id(&mut self, id: EntryId);

    fn has_id(&self) -> bool {
        self.id() != 0
    }
}

/// An income or expense line.
///
/// Reading is tolerant (see `lenient`): other clients write the same blob
/// and an odd field must not cost the whole dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LedgerEntry {
    #[serde(default, deserialize_with = "lenient::id")]
    pub id: EntryId,
    #[serde(rename = "descricao", default, deserialize_with = "lenient::text")]
    pub description: String,
    #[serde(rename = "valor", default, deserialize_with = "lenient::amount")]
    pub amount: f64,
    #[serde(rename = "categoria", default, deserialize_with = "lenient::text")]
    pub category: String,
    #[serde(
        rename = "dataVencimento",
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<String>,
    #[serde(
        rename = "dataPagamento",
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_date: Option<String>,
    #[serde(rename = "pago", default, deserialize_with = "lenient::flag")]
    pub paid: bool,
    /// Zero-based month, as stored by the existing clients.
    #[serde(
        rename = "mes",
        default,
        deserialize_with = "lenient::optional_integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub month: Option<u32>,
    #[serde(
        rename = "ano",
        default,
        deserialize_with = "lenient::optional_integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub year: Option<i32>,
    #[serde(
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<String>,
    #[serde(
        rename = "origem",
        default,
        deserialize_with = "lenient::optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub origin: Option<String>,
    /// Fields written by other clients that this crate does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LedgerEntry {
    pub fn new(description: impl Into<String>, amount: f64, category: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            amount,
            category: category.into(),
            ..Self::default()
        }
    }

    /// Set the due date and derive the month/year bucket from it.
    pub fn with_due_date(mut self, date: impl Into<String>) -> Self {
        let date = date.into();
        if let Some((month, year)) = derive_period(&date) {
            self.month = Some(month);
            self.year = Some(year);
        }
        self.due_date = Some(date);
        self
    }

    /// Fill in the month/year bucket from the due date when neither is set.
    pub fn derive_missing_period(&mut self) {
        if self.month.is_some() || self.year.is_some() {
            return;
        }
        if let Some((month, year)) = self.due_date.as_deref().and_then(derive_period) {
            self.month = Some(month);
            self.year = Some(year);
        }
    }

    /// Mark the entry paid on the given date.
    pub fn paid_on(mut self, date: impl Into<String>) -> Self {
        self.payment_date = Some(date.into());
        self.paid = true;
        self
    }
}

impl Identified for LedgerEntry {
    fn id(&self) -> EntryId {
        self.id
    }

    fn set_id(&mut self, id: EntryId) {
        self.id = id;
    }
}

/// Parse a `YYYY-MM-DD` prefix into (zero-based month, year).
pub fn derive_period(date: &str) -> Option<(u32, i32)> {
    let day = date.get(..10)?;
    let parsed = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
    Some((parsed.month0(), parsed.year()))
}

/// Why an update could not be merged into an entry.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("`{field}` must be {expected}")]
    WrongType { field: String, expected: &'static str },

    #[error(transparent)]
    Encode(#[from] serde_json::Error),
}

/// Updates are checked strictly even though stored entries are read
/// leniently: a caller sending `"valor": "a lot"` gets an error, not a zero.
fn check_field(key: &str, value: &Value) -> Result<(), FieldError> {
    let (ok, expected) = match key {
        "valor" => (value.as_f64().is_some_and(f64::is_finite), "a finite number"),
        "pago" => (value.is_boolean(), "true or false"),
        "mes" => (value.is_null() || value.as_u64().is_some(), "a whole number"),
        "ano" => (value.is_null() || value.as_i64().is_some(), "a whole number"),
        "descricao" | "categoria" | "data" => (value.is_string(), "a string"),
        "dataVencimento" | "dataPagamento" | "timestamp" | "origem" => {
            (value.is_null() || value.is_string(), "a string or null")
        }
        _ => (true, ""),
    };
    if ok {
        Ok(())
    } else {
        Err(FieldError::WrongType {
            field: key.to_string(),
            expected,
        })
    }
}

/// Shallow field-level merge: every top-level field in `fields` replaces the
/// matching field of `item`; fields not mentioned are kept. The `id` field is
/// never overwritten.
pub fn merge_fields<T>(item: &T, fields: &Map<String, Value>) -> Result<T, FieldError>
where
    T: Serialize + DeserializeOwned,
{
    for (key, field) in fields {
        check_field(key, field)?;
    }

    let mut value = serde_json::to_value(item)?;
    if let Value::Object(ref mut object) = value {
        for (key, field) in fields {
            if key == "id" {
                continue;
            }
            object.insert(key.clone(), field.clone());
        }
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_uses_blob_field_names() {
        let entry = LedgerEntry::new("Aluguel", 1200.0, "moradia").with_due_date("2024-03-01");
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["descricao"], "Aluguel");
        assert_eq!(value["valor"], 1200.0);
        assert_eq!(value["categoria"], "moradia");
        assert_eq!(value["dataVencimento"], "2024-03-01");
        assert_eq!(value["mes"], 2);
        assert_eq!(value["ano"], 2024);
        assert!(value.get("origem").is_none());
    }

    #[test]
    fn test_unknown_fields_survive() {
        let raw = json!({"id": 7, "descricao": "Luz", "valor": 90.5, "recorrente": true});
        let entry: LedgerEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.id, 7);
        assert_eq!(entry.extra.get("recorrente"), Some(&json!(true)));

        let back = serde_json::to_value(&entry).unwrap();
        assert_eq!(back["recorrente"], true);
    }

    #[test]
    fn test_derive_period() {
        assert_eq!(derive_period("2024-03-01"), Some((2, 2024)));
        assert_eq!(derive_period("2023-12-31T10:00:00Z"), Some((11, 2023)));
        assert_eq!(derive_period("03/01/2024"), None);
        assert_eq!(derive_period(""), None);
    }

    #[test]
    fn test_merge_fields_incoming_wins() {
        let entry = LedgerEntry {
            id: 42,
            ..LedgerEntry::new("Internet", 100.0, "casa")
        };
        let mut fields = Map::new();
        fields.insert("valor".into(), json!(120.0));
        fields.insert("pago".into(), json!(true));

        let merged = merge_fields(&entry, &fields).unwrap();
        assert_eq!(merged.amount, 120.0);
        assert!(merged.paid);
        assert_eq!(merged.description, "Internet");
        assert_eq!(merged.id, 42);
    }

    #[test]
    fn test_merge_fields_keeps_id() {
        let entry = LedgerEntry {
            id: 42,
            ..LedgerEntry::default()
        };
        let mut fields = Map::new();
        fields.insert("id".into(), json!(99));
        assert_eq!(merge_fields(&entry, &fields).unwrap().id, 42);
    }

    #[test]
    fn test_merge_fields_rejects_wrong_type() {
        let entry = LedgerEntry::default();
        let mut fields = Map::new();
        fields.insert("valor".into(), json!("a lot"));
        let err = merge_fields(&entry, &fields).unwrap_err();
        assert_eq!(err.to_string(), "`valor` must be a finite number");

        let mut fields = Map::new();
        fields.insert("pago".into(), json!("sim"));
        assert!(merge_fields(&entry, &fields).is_err());
    }

    #[test]
    fn test_odd_field_types_do_not_fail_the_entry() {
        let raw = json!({
            "id": "1712345678901",
            "descricao": "Agua",
            "valor": null,
            "categoria": "casa",
            "pago": "true",
            "mes": "3",
            "ano": 2024.0,
            "dataVencimento": null
        });
        let entry: LedgerEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.id, 1_712_345_678_901);
        assert_eq!(entry.amount, 0.0);
        assert!(entry.paid);
        assert_eq!(entry.month, Some(3));
        assert_eq!(entry.year, Some(2024));
        assert!(entry.due_date.is_none());
        assert!(entry.extra.is_empty());
    }

    #[test]
    fn test_derive_missing_period() {
        let mut entry = LedgerEntry {
            due_date: Some("2024-11-05".into()),
            ..LedgerEntry::default()
        };
        entry.derive_missing_period();
        assert_eq!((entry.month, entry.year), (Some(10), Some(2024)));

        // An explicit bucket is left alone
        let mut entry = LedgerEntry {
            due_date: Some("2024-11-05".into()),
            month: Some(0),
            ..LedgerEntry::default()
        };
        entry.derive_missing_period();
        assert_eq!((entry.month, entry.year), (Some(0), None));
    }
}
