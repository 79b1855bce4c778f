//! Schema metadata types for tables, columns, indexes, and constraints.
//!
//! These are the shapes reported by source introspection, before any
//! target-side mapping. Index rows arrive flattened (one row per column per
//! key, as the source catalog reports them) and are grouped here into
//! composite definitions.

use serde::{Deserialize, Serialize};

/// A single column as reported by the source catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name, case preserved.
    pub name: String,

    /// Raw source type string (e.g. `"int(11) unsigned"`).
    pub source_type: String,

    /// Whether the column is auto-increment.
    pub is_auto_increment: bool,
}

/// A table with its ordered column list.
///
/// Constructed fresh from a live introspection call whenever a phase needs
/// it; never cached across tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table name, case-sensitive as reported by the source catalog.
    pub name: String,

    /// Columns in source-reported order.
    pub columns: Vec<ColumnDefinition>,
}

impl TableSchema {
    /// Column names in source-reported order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// One flattened index row: (key name, column, uniqueness), exactly as the
/// source catalog reports it. Multiple rows sharing a key name represent one
/// composite index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    /// Index key name; `"PRIMARY"` is reserved for the primary key.
    pub key_name: String,

    /// Column participating in the index.
    pub column_name: String,

    /// MySQL NON_UNIQUE flag: false means the index enforces uniqueness.
    pub non_unique: bool,
}

/// A composite index assembled from flattened rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Key name on the source.
    pub key_name: String,

    /// Whether the index enforces uniqueness.
    pub is_unique: bool,

    /// Columns in key order.
    pub columns: Vec<String>,
}

/// One foreign-key row: a single referencing column of a named constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyConstraint {
    /// Constraint name, unique per referencing table.
    pub constraint_name: String,

    /// Referencing table.
    pub table_name: String,

    /// Referencing column.
    pub column_name: String,

    /// Referenced table.
    pub foreign_table_name: String,

    /// Referenced column.
    pub foreign_column_name: String,
}

/// Index rows grouped into regular indexes and the primary-key column set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexGroups {
    /// Regular (non-PRIMARY) indexes, in first-seen key-name order.
    pub indexes: Vec<IndexDefinition>,

    /// Ordered primary-key columns, accumulated across all PRIMARY rows.
    /// Empty when the table has no primary key.
    pub primary_key: Vec<String>,
}

/// Group flattened index rows by key name, preserving first-seen order of
/// keys and of columns within each key. `PRIMARY` rows are routed into the
/// composite primary-key column list instead of a regular index.
pub fn group_index_rows(rows: &[IndexRow]) -> IndexGroups {
    let mut groups = IndexGroups::default();

    for row in rows {
        if row.key_name == "PRIMARY" {
            groups.primary_key.push(row.column_name.clone());
            continue;
        }

        match groups
            .indexes
            .iter_mut()
            .find(|idx| idx.key_name == row.key_name)
        {
            Some(idx) => idx.columns.push(row.column_name.clone()),
            None => groups.indexes.push(IndexDefinition {
                key_name: row.key_name.clone(),
                is_unique: !row.non_unique,
                columns: vec![row.column_name.clone()],
            }),
        }
    }

    groups
}
