// ============================================
// Interaction Dataset Loading
// ============================================
//
// Reads the tabular interaction contract:
//   required: user_id, item_id, rating, timestamp
//   optional: review_text, helpful_votes, verified_purchase, category
//
// Rows arrive as a JSON array of objects. Validation happens before any
// training computation; a bad row rejects the whole dataset.

pub mod synthetic;

use crate::models::Interaction;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const REQUIRED_COLUMNS: [&str; 4] = ["user_id", "item_id", "rating", "timestamp"];

const NAIVE_TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

#[derive(Debug, Error, PartialEq)]
pub enum DataError {
    #[error("Training data cannot be empty")]
    EmptyDataset,

    #[error("Missing required column '{column}' in row {row}")]
    MissingColumn { column: &'static str, row: usize },

    #[error("Invalid value for '{column}' in row {row}: {reason}")]
    InvalidValue {
        column: &'static str,
        row: usize,
        reason: String,
    },

    #[error("Failed to parse dataset: {0}")]
    Parse(String),

    #[error("Failed to read dataset: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, DataError>;

/// Load interactions from a JSON file containing an array of rows
pub fn load_json(path: impl AsRef<Path>) -> Result<Vec<Interaction>> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| DataError::Io(format!("{}: {}", path.display(), e)))?;
    let interactions = parse_records(&raw)?;

    info!(
        path = %path.display(),
        rows = interactions.len(),
        "Loaded interaction dataset"
    );

    Ok(interactions)
}

/// Parse a JSON array of interaction rows
pub fn parse_records(raw: &str) -> Result<Vec<Interaction>> {
    let document: Value = serde_json::from_str(raw).map_err(|e| DataError::Parse(e.to_string()))?;
    let rows = document
        .as_array()
        .ok_or_else(|| DataError::Parse("dataset must be a JSON array of rows".to_string()))?;

    if rows.is_empty() {
        return Err(DataError::EmptyDataset);
    }

    rows.iter()
        .enumerate()
        .map(|(row, value)| parse_row(row, value))
        .collect()
}

/// Reject datasets the pipeline cannot train on
pub fn validate_interactions(interactions: &[Interaction]) -> Result<()> {
    if interactions.is_empty() {
        return Err(DataError::EmptyDataset);
    }

    for (row, interaction) in interactions.iter().enumerate() {
        if interaction.user_id.is_empty() {
            return Err(invalid("user_id", row, "identifier is empty"));
        }
        if interaction.item_id.is_empty() {
            return Err(invalid("item_id", row, "identifier is empty"));
        }
        if !interaction.rating.is_finite() {
            return Err(invalid("rating", row, "rating must be a finite number"));
        }
    }

    Ok(())
}

fn parse_row(row: usize, value: &Value) -> Result<Interaction> {
    let fields = value
        .as_object()
        .ok_or_else(|| invalid("row", row, "row must be a JSON object"))?;

    for column in REQUIRED_COLUMNS {
        if !fields.contains_key(column) {
            return Err(DataError::MissingColumn { column, row });
        }
    }

    Ok(Interaction {
        user_id: parse_id(fields, "user_id", row)?,
        item_id: parse_id(fields, "item_id", row)?,
        rating: parse_rating(&fields["rating"], row)?,
        timestamp: parse_timestamp(&fields["timestamp"], row)?,
        review_text: parse_optional_text(fields, "review_text", row)?,
        helpful_votes: parse_helpful_votes(fields, row)?,
        verified_purchase: parse_verified(fields, row)?,
        category: parse_optional_text(fields, "category", row)?,
    })
}

fn parse_id(fields: &Map<String, Value>, column: &'static str, row: usize) -> Result<String> {
    match &fields[column] {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(invalid(column, row, format!("expected string or number, got {}", other))),
    }
}

fn parse_rating(value: &Value, row: usize) -> Result<f64> {
    let rating = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    rating
        .filter(|r| r.is_finite())
        .ok_or_else(|| invalid("rating", row, format!("expected a number, got {}", value)))
}

fn parse_timestamp(value: &Value, row: usize) -> Result<DateTime<Utc>> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    };

    parsed.ok_or_else(|| invalid("timestamp", row, format!("unrecognised timestamp {}", value)))
}

fn parse_timestamp_str(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn parse_optional_text(
    fields: &Map<String, Value>,
    column: &'static str,
    row: usize,
) -> Result<Option<String>> {
    match fields.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(column, row, format!("expected string, got {}", other))),
    }
}

fn parse_helpful_votes(fields: &Map<String, Value>, row: usize) -> Result<u32> {
    let value = match fields.get("helpful_votes") {
        None | Some(Value::Null) => return Ok(0),
        Some(value) => value,
    };

    let votes = value
        .as_i64()
        .ok_or_else(|| invalid("helpful_votes", row, format!("expected an integer, got {}", value)))?;

    if votes < 0 {
        return Err(invalid("helpful_votes", row, "must be non-negative"));
    }

    u32::try_from(votes).map_err(|_| invalid("helpful_votes", row, "value too large"))
}

fn parse_verified(fields: &Map<String, Value>, row: usize) -> Result<bool> {
    match fields.get("verified_purchase") {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::Number(n)) => Ok(n.as_f64().map(|v| v != 0.0).unwrap_or(false)),
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" | "" => Ok(false),
            _ => Err(invalid("verified_purchase", row, format!("unrecognised flag '{}'", s))),
        },
        Some(other) => Err(invalid(
            "verified_purchase",
            row,
            format!("expected boolean, got {}", other),
        )),
    }
}

fn invalid(column: &'static str, row: usize, reason: impl Into<String>) -> DataError {
    DataError::InvalidValue {
        column,
        row,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_records_with_optional_columns() {
        let raw = r#"[
            {"user_id": "u1", "item_id": "i1", "rating": 5, "timestamp": "2023-06-15 08:30:00",
             "review_text": "Great", "helpful_votes": 3, "verified_purchase": true, "category": "Books"},
            {"user_id": 42, "item_id": "i2", "rating": "2.5", "timestamp": "2023-06-15T22:00:00Z"}
        ]"#;

        let rows = parse_records(raw).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].timestamp.hour(), 8);
        assert_eq!(rows[0].helpful_votes, 3);
        assert!(rows[0].verified_purchase);
        assert_eq!(rows[0].category.as_deref(), Some("Books"));

        assert_eq!(rows[1].user_id, "42");
        assert_eq!(rows[1].rating, 2.5);
        assert_eq!(rows[1].review_text, None);
        assert_eq!(rows[1].helpful_votes, 0);
        assert!(!rows[1].verified_purchase);
    }

    #[test]
    fn test_missing_required_column() {
        let raw = r#"[{"user_id": "u1", "item_id": "i1", "timestamp": "2023-01-01"}]"#;
        assert_eq!(
            parse_records(raw),
            Err(DataError::MissingColumn {
                column: "rating",
                row: 0
            })
        );
    }

    #[test]
    fn test_empty_dataset() {
        assert_eq!(parse_records("[]"), Err(DataError::EmptyDataset));
        assert_eq!(validate_interactions(&[]), Err(DataError::EmptyDataset));
    }

    #[test]
    fn test_negative_helpful_votes_rejected() {
        let raw = r#"[{"user_id": "u", "item_id": "i", "rating": 3, "timestamp": 0, "helpful_votes": -1}]"#;
        assert!(matches!(
            parse_records(raw),
            Err(DataError::InvalidValue {
                column: "helpful_votes",
                ..
            })
        ));
    }

    #[test]
    fn test_timestamp_formats() {
        let date_only = parse_timestamp_str("2023-12-31").unwrap();
        assert_eq!((date_only.month(), date_only.day(), date_only.hour()), (12, 31, 0));

        let epoch = parse_timestamp(&Value::from(86_400), 0).unwrap();
        assert_eq!(epoch.day(), 2);

        assert!(parse_timestamp_str("yesterday").is_none());
    }

    #[test]
    fn test_validate_rejects_non_finite_rating() {
        let ts = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let rows = vec![Interaction::new("u", "i", f64::NAN, ts)];
        assert!(matches!(
            validate_interactions(&rows),
            Err(DataError::InvalidValue { column: "rating", .. })
        ));
    }
}
