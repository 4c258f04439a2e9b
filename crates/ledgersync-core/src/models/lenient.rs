//! Tolerant readers for blob fields.
//!
//! Several clients write the same document and none of them are strict
//! about types: amounts show up as `null` or as strings, ids as strings or
//! floats. One odd field must never make a whole dataset unreadable, so
//! scalar fields fall back to a neutral value instead of failing. Only a
//! container of the wrong shape (a dataset that is not a list, a list item
//! that is not an object) is reported as an error.

use std::collections::BTreeMap;

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::entry::EntryId;

/// A finite number, from a JSON number or a numeric string.
pub(crate) fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|n| n.is_finite())
}

fn integer(value: &Value) -> Option<i64> {
    if let Value::Number(n) = value {
        if let Some(i) = n.as_i64() {
            return Some(i);
        }
    }
    if let Value::String(s) = value {
        if let Ok(i) = s.trim().parse::<i64>() {
            return Some(i);
        }
    }
    number(value).map(|n| n.trunc() as i64)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Ids arrive as integers, floats or numeric strings. Anything else reads
/// as unassigned.
pub fn id<'de, D>(deserializer: D) -> Result<EntryId, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(integer(&raw).unwrap_or(0))
}

/// `null`, missing and non-numeric amounts read as zero.
pub fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(number(&raw).unwrap_or(0.0))
}

pub fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_text(deserializer)?.unwrap_or_default())
}

pub fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Whole numbers that fit `T`; anything else reads as absent.
pub fn optional_integer<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(number(&raw)
        .filter(|n| n.fract() == 0.0)
        .and_then(|n| T::try_from(n as i64).ok()))
}

/// A list dataset, `null` reading as empty.
pub fn entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(optional_entries(deserializer)?.unwrap_or_default())
}

/// A list dataset in a patch, `null` reading as absent.
pub fn optional_entries<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Null => return Ok(None),
        Value::Array(items) => items,
        other => {
            return Err(D::Error::custom(format!(
                "expected a list of entries, found {}",
                describe(&other)
            )))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(D::Error::custom(format!(
                    "entry {} is {}, not an object",
                    index,
                    describe(&item)
                )));
            }
            serde_json::from_value(item)
                .map_err(|e| D::Error::custom(format!("entry {}: {}", index, e)))
        })
        .collect::<Result<Vec<T>, D::Error>>()
        .map(Some)
}

/// A keyed map dataset, `null` reading as empty.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

pub fn balances<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_balances(deserializer)?.unwrap_or_default())
}

/// Per-period balances; a balance that is not a number reads as zero.
pub fn optional_balances<'de, D>(deserializer: D) -> Result<Option<BTreeMap<String, f64>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(
            map.into_iter()
                .map(|(period, balance)| (period, number(&balance).unwrap_or(0.0)))
                .collect(),
        )),
        other => Err(D::Error::custom(format!(
            "expected balances keyed by period, found {}",
            describe(&other)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "id")]
        id: EntryId,
        #[serde(default, deserialize_with = "amount")]
        valor: f64,
        #[serde(default, deserialize_with = "optional_integer")]
        mes: Option<u32>,
    }

    fn read(value: Value) -> Sample {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_ids_from_strings_and_floats() {
        assert_eq!(read(json!({"id": 17})).id, 17);
        assert_eq!(read(json!({"id": "1712345678901"})).id, 1_712_345_678_901);
        assert_eq!(read(json!({"id": 1712345678901.0})).id, 1_712_345_678_901);
        assert_eq!(read(json!({"id": 12.7})).id, 12);
        assert_eq!(read(json!({"id": "abc"})).id, 0);
        assert_eq!(read(json!({"id": null})).id, 0);
    }

    #[test]
    fn test_amounts_never_fail() {
        assert_eq!(read(json!({"valor": 90})).valor, 90.0);
        assert_eq!(read(json!({"valor": " 12.5 "})).valor, 12.5);
        assert_eq!(read(json!({"valor": null})).valor, 0.0);
        assert_eq!(read(json!({"valor": "NaN"})).valor, 0.0);
        assert_eq!(read(json!({"valor": [1, 2]})).valor, 0.0);
        assert_eq!(read(json!({})).valor, 0.0);
    }

    #[test]
    fn test_integer_fields() {
        assert_eq!(read(json!({"mes": 4})).mes, Some(4));
        assert_eq!(read(json!({"mes": "4"})).mes, Some(4));
        assert_eq!(read(json!({"mes": 4.5})).mes, None);
        assert_eq!(read(json!({"mes": -1})).mes, None);
        assert_eq!(read(json!({"mes": null})).mes, None);
    }
}
