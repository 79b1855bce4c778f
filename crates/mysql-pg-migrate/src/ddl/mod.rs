//! Idempotent DDL builders for the PostgreSQL target.
//!
//! Every builder is a pure function from introspected metadata to SQL text.
//! Creation statements are conditioned on absence (`IF NOT EXISTS`) where
//! PostgreSQL offers that form; primary keys and foreign keys have no such
//! form, so the orchestrator pairs their statements with catalog pre-checks.

use crate::error::Result;
use crate::schema::{ForeignKeyConstraint, IndexDefinition, TableSchema};
use crate::typemap::mysql_to_postgres;

/// Quote a PostgreSQL identifier, preserving case and reserved words.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build `CREATE TABLE IF NOT EXISTS` for a table, columns in
/// source-reported order.
///
/// Fails with the mapper's error when any column type has no mapping rule;
/// that aborts the table's DDL build.
pub fn build_create_table(table: &TableSchema) -> Result<String> {
    let mut column_defs = Vec::with_capacity(table.columns.len());
    for col in &table.columns {
        let extra = if col.is_auto_increment { "auto_increment" } else { "" };
        let pg_type = mysql_to_postgres(&col.source_type, extra)?;
        column_defs.push(format!("{} {}", quote_ident(&col.name), pg_type.as_sql()));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(&table.name),
        column_defs.join(", ")
    ))
}

/// Build `CREATE [UNIQUE] INDEX IF NOT EXISTS` for one composite index.
///
/// The index name is prefixed with the table name: MySQL key names are only
/// unique per table, PostgreSQL index names per schema.
pub fn build_create_index(table: &str, index: &IndexDefinition) -> String {
    let unique = if index.is_unique { "UNIQUE " } else { "" };
    let cols: Vec<String> = index.columns.iter().map(|c| quote_ident(c)).collect();

    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        unique,
        quote_ident(&format!("{}_{}", table, index.key_name)),
        quote_ident(table),
        cols.join(", ")
    )
}

/// Build a single `ALTER TABLE ... ADD PRIMARY KEY` over the composite
/// column list. The orchestrator only issues this when the target catalog
/// reports no existing primary key.
pub fn build_add_primary_key(table: &str, columns: &[String]) -> String {
    let cols: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();

    format!(
        "ALTER TABLE {} ADD PRIMARY KEY ({})",
        quote_ident(table),
        cols.join(", ")
    )
}

/// Build `ALTER TABLE ... ADD CONSTRAINT ... FOREIGN KEY` for one
/// referencing column. The orchestrator pre-checks the constraint name in
/// the target catalog and skips existing constraints.
pub fn build_add_foreign_key(fk: &ForeignKeyConstraint) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
        quote_ident(&fk.table_name),
        quote_ident(&fk.constraint_name),
        quote_ident(&fk.column_name),
        quote_ident(&fk.foreign_table_name),
        quote_ident(&fk.foreign_column_name)
    )
}
