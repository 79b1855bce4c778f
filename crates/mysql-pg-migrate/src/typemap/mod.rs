//! Type mapping between MySQL and PostgreSQL.

use crate::error::{MigrateError, Result};

/// PostgreSQL column type produced by the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PgType {
    Integer,
    Serial,
    BigSerial,
    Real,
    Numeric,
    Timestamp,
    Date,
    Text,
    Char,
    Varchar,
    Json,
}

impl PgType {
    /// DDL spelling of the type.
    pub fn as_sql(&self) -> &'static str {
        match self {
            PgType::Integer => "INTEGER",
            PgType::Serial => "SERIAL",
            PgType::BigSerial => "BIGSERIAL",
            PgType::Real => "REAL",
            PgType::Numeric => "NUMERIC",
            PgType::Timestamp => "TIMESTAMP",
            PgType::Date => "DATE",
            PgType::Text => "TEXT",
            PgType::Char => "CHAR",
            PgType::Varchar => "VARCHAR",
            PgType::Json => "JSON",
        }
    }

    /// Parameter cast suffix used when binding values into this column.
    ///
    /// Every value is bound as text and converted server-side. A cast-only
    /// placeholder (`$1::integer`) would make the prepared statement expect
    /// an integer parameter, which a text binding cannot satisfy, so
    /// non-text columns pin the placeholder to text first and convert from
    /// there. SERIAL columns convert to their backing integer type.
    pub fn param_cast(&self) -> &'static str {
        match self {
            PgType::Integer | PgType::Serial => "::text::integer",
            PgType::BigSerial => "::text::bigint",
            PgType::Real => "::text::real",
            PgType::Numeric => "::text::numeric",
            PgType::Timestamp => "::text::timestamp",
            PgType::Date => "::text::date",
            PgType::Text => "::text",
            PgType::Char | PgType::Varchar => "::varchar",
            PgType::Json => "::text::json",
        }
    }

    /// Whether the column holds a calendar instant (subject to
    /// invalid-date normalization during transfer).
    pub fn is_temporal(&self) -> bool {
        matches!(self, PgType::Timestamp | PgType::Date)
    }
}

impl std::fmt::Display for PgType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Reduce a raw MySQL column type to its bare token: the length/precision
/// suffix and the unsigned qualifier removed, lowercased.
///
/// `"int(11) unsigned"` -> `"int"`, `"decimal(10,2)"` -> `"decimal"`.
pub fn bare_token(raw: &str) -> String {
    let mut token = raw.trim().to_ascii_lowercase();
    if let Some(open) = token.find('(') {
        match token[open..].find(')') {
            Some(close) => token.replace_range(open..open + close + 1, ""),
            None => token.truncate(open),
        }
    }
    token.replace("unsigned", "").trim().to_string()
}

/// Map a raw MySQL column type to a PostgreSQL type.
///
/// `source_type` is the unmodified COLUMN_TYPE string (e.g.
/// `"int(11) unsigned"`, `"enum('a','b')"`); `extra` is the EXTRA attribute
/// string, consulted only for `auto_increment`.
///
/// Rule order matters: `decimal(10,2)` and enum literals must be classified
/// by substring before length stripping, and an auto-increment integer must
/// become a sequence-backed type rather than plain INTEGER.
pub fn mysql_to_postgres(source_type: &str, extra: &str) -> Result<PgType> {
    let lowered = source_type.to_ascii_lowercase();
    let token = bare_token(source_type);

    if lowered.contains("enum") {
        return Ok(PgType::Varchar);
    }

    if lowered.contains("decimal") {
        return Ok(PgType::Numeric);
    }

    if extra.to_ascii_lowercase().contains("auto_increment") {
        return match token.as_str() {
            "bigint" => Ok(PgType::BigSerial),
            "int" => Ok(PgType::Serial),
            _ => Err(MigrateError::UnsupportedAutoIncrementType(
                source_type.to_string(),
            )),
        };
    }

    if lowered.contains("char") {
        return Ok(PgType::Varchar);
    }

    match token.as_str() {
        "int" | "tinyint" | "smallint" | "mediumint" | "bigint" => Ok(PgType::Integer),
        "float" => Ok(PgType::Real),
        "double" | "decimal" => Ok(PgType::Numeric),
        "datetime" | "timestamp" => Ok(PgType::Timestamp),
        "date" => Ok(PgType::Date),
        "text" | "tinytext" | "mediumtext" | "longtext" => Ok(PgType::Text),
        "char" => Ok(PgType::Char),
        "json" => Ok(PgType::Json),
        "enum" | "varchar" => Ok(PgType::Varchar),
        _ => Err(MigrateError::UnsupportedType(source_type.to_string())),
    }
}
