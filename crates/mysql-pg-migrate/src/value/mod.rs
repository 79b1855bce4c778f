//! SQL value types for database-agnostic row transfer.
//!
//! Source rows are dynamically typed; each field is carried as a [`SqlValue`]
//! variant. Values are bound to the target's parameterized-statement
//! interface as strings and cast server-side (see
//! [`PgType::param_cast`](crate::typemap::PgType::param_cast)).

use chrono::{NaiveDate, NaiveDateTime};

use crate::typemap::PgType;

/// A single dynamically-typed field value read from the source.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Decimal carried as its exact string form; PostgreSQL parses it on cast.
    Decimal(String),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Render the value for parameter binding, `None` for SQL NULL.
    pub fn to_param(&self) -> Option<String> {
        match self {
            SqlValue::Null => None,
            SqlValue::Bool(b) => Some(if *b { "t".to_string() } else { "f".to_string() }),
            SqlValue::Int(n) => Some(n.to_string()),
            SqlValue::Float(n) => Some(n.to_string()),
            SqlValue::Decimal(s) => Some(s.clone()),
            SqlValue::Text(s) => Some(s.clone()),
            SqlValue::Date(d) => Some(d.to_string()),
            SqlValue::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string()),
        }
    }
}

/// Normalize a value for a target column before binding.
///
/// A date/time field that is not a valid calendar instant (MySQL zero dates
/// such as `0000-00-00 00:00:00` surface as undecodable text) becomes NULL;
/// everything else passes through unchanged.
pub fn normalize(value: SqlValue, target_type: &PgType) -> SqlValue {
    if !target_type.is_temporal() {
        return value;
    }

    match value {
        SqlValue::Text(raw) => match target_type {
            PgType::Date => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map(SqlValue::Date)
                .unwrap_or(SqlValue::Null),
            _ => parse_instant(raw.trim())
                .map(SqlValue::DateTime)
                .unwrap_or(SqlValue::Null),
        },
        other => other,
    }
}

/// Parse a timestamp string, with or without fractional seconds.
fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
