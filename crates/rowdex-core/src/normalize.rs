//! Record → document normalization.
//!
//! Turns a [`Record`] into the canonical text that gets embedded, plus the
//! id the resulting entry is stored under.
//!
//! # Format
//!
//! Fields are written as `column=value` in declared column order, joined by
//! a single space:
//!
//! ```rust
//! use rowdex_core::models::{Record, Value};
//! use rowdex_core::normalize::normalize;
//!
//! let record = Record::from_pairs([("id", Value::from(1)), ("name", Value::from("a"))]);
//! let doc = normalize(0, &record, Some("id")).unwrap();
//! assert_eq!(doc.id, "1");
//! assert_eq!(doc.text, "id=1 name=a");
//! ```
//!
//! Without a key column the id is the record's zero-based ordinal in the
//! result set. `normalize` is pure: the same inputs always yield the same
//! document.

use crate::error::{Error, Result};
use crate::models::{Document, Record};

/// Normalize one record.
///
/// # Errors
///
/// [`Error::Normalization`] when the record is empty, when a value has no
/// text form (binary columns), or when the designated key column is absent
/// or null. The build skips such records and counts them.
pub fn normalize(ordinal: usize, record: &Record, key_column: Option<&str>) -> Result<Document> {
    let id = record_id(ordinal, record, key_column)?;

    if record.is_empty() {
        return Err(Error::Normalization {
            record: id,
            reason: "record has no columns".to_string(),
        });
    }

    let mut parts = Vec::with_capacity(record.len());
    for (column, value) in record.iter() {
        let text = value.canonical().ok_or_else(|| Error::Normalization {
            record: id.clone(),
            reason: format!("column '{}' holds binary data", column),
        })?;
        parts.push(format!("{}={}", column, text));
    }

    Ok(Document {
        id,
        text: parts.join(" "),
    })
}

/// Resolve the id a record is stored under.
pub fn record_id(ordinal: usize, record: &Record, key_column: Option<&str>) -> Result<String> {
    let Some(key) = key_column else {
        return Ok(ordinal.to_string());
    };

    match record.get(key) {
        Some(value) if !value.is_null() => {
            value.canonical().ok_or_else(|| Error::Normalization {
                record: ordinal.to_string(),
                reason: format!("key column '{}' holds binary data", key),
            })
        }
        Some(_) => Err(Error::Normalization {
            record: ordinal.to_string(),
            reason: format!("key column '{}' is null", key),
        }),
        None => Err(Error::Normalization {
            record: ordinal.to_string(),
            reason: format!("key column '{}' is missing", key),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn row(id: i64, name: &str) -> Record {
        Record::from_pairs([("id", Value::from(id)), ("name", Value::from(name))])
    }

    #[test]
    fn test_declared_order_and_key_column() {
        let doc = normalize(5, &row(2, "b"), Some("id")).unwrap();
        assert_eq!(doc.id, "2");
        assert_eq!(doc.text, "id=2 name=b");
    }

    #[test]
    fn test_ordinal_id_without_key() {
        let doc = normalize(7, &row(2, "b"), None).unwrap();
        assert_eq!(doc.id, "7");
    }

    #[test]
    fn test_deterministic() {
        let r = row(9, "nine");
        assert_eq!(normalize(0, &r, None).unwrap(), normalize(0, &r, None).unwrap());
    }

    #[test]
    fn test_all_value_kinds_kept() {
        let record = Record::from_pairs([
            ("a", Value::Null),
            ("b", Value::Bool(true)),
            ("c", Value::Float(1.25)),
            ("d", Value::from("x y")),
        ]);
        let doc = normalize(0, &record, None).unwrap();
        assert_eq!(doc.text, "a=null b=true c=1.25 d=x y");
    }

    #[test]
    fn test_binary_column_fails() {
        let record = Record::from_pairs([("id", Value::from(1)), ("blob", Value::Bytes(vec![1]))]);
        let err = normalize(0, &record, Some("id")).unwrap_err();
        assert!(err.is_recoverable());
        match err {
            Error::Normalization { record, reason } => {
                assert_eq!(record, "1");
                assert!(reason.contains("blob"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_record_fails() {
        let err = normalize(3, &Record::new(), None).unwrap_err();
        assert_eq!(err.kind(), "normalization");
    }

    #[test]
    fn test_missing_or_null_key_fails() {
        let record = Record::from_pairs([("name", Value::from("a"))]);
        assert!(normalize(0, &record, Some("id")).is_err());

        let record = Record::from_pairs([("id", Value::Null)]);
        assert!(normalize(0, &record, Some("id")).is_err());
    }
}
