//! Source catalog reader: trait seam plus the MySQL implementation.
//!
//! The orchestrator and transfer engine only ever see [`SourceCatalog`];
//! [`MysqlSource`] implements it over sqlx with `INFORMATION_SCHEMA`
//! queries. All operations are read-only; source errors propagate without
//! interpretation and are fatal for the run.

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::Result;
use crate::schema::{ColumnDefinition, ForeignKeyConstraint, IndexRow};
use crate::typemap::bare_token;
use crate::value::SqlValue;

/// Connection timeout for the source pool.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// A row read from the source: one value per described column, in
/// source-reported column order.
pub type SourceRow = Vec<SqlValue>;

/// Read-only access to the source catalog and table data.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    /// All table names in the source database, in catalog-reported order.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// Ordered column definitions for a table.
    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDefinition>>;

    /// Flattened index rows for a table (one row per column per key,
    /// `PRIMARY` included), not yet grouped.
    async fn list_indexes(&self, table: &str) -> Result<Vec<IndexRow>>;

    /// Foreign-key rows for a table, one per referencing column.
    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyConstraint>>;

    /// One page of rows, values aligned with `columns`.
    async fn fetch_page(
        &self,
        table: &str,
        columns: &[ColumnDefinition],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SourceRow>>;

    /// Total row count for a table (used by post-run validation).
    async fn count_rows(&self, table: &str) -> Result<i64>;
}

/// MySQL source implementation.
pub struct MysqlSource {
    pool: MySqlPool,
    database: String,
}

impl MysqlSource {
    /// Connect to the source and verify the connection.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(options)
            .await?;

        sqlx::query("SELECT 1").fetch_one(&pool).await?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Quote a MySQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Decode one field by the bare token of its declared source type.
    ///
    /// Temporal fields decode leniently: an instant MySQL reports but chrono
    /// rejects (zero dates) falls back to its raw text form, which the
    /// transfer engine normalizes to NULL before binding.
    fn decode_field(row: &MySqlRow, idx: usize, col: &ColumnDefinition) -> SqlValue {
        use sqlx::ValueRef;

        let is_null = row.try_get_raw(idx).map(|r| r.is_null()).unwrap_or(true);
        if is_null {
            return SqlValue::Null;
        }

        let token = bare_token(&col.source_type);
        let unsigned = col.source_type.to_ascii_lowercase().contains("unsigned");

        match token.as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "bigint" => {
                if unsigned {
                    row.try_get::<u64, _>(idx)
                        .map(|v| SqlValue::Int(v as i64))
                        .or_else(|_| row.try_get::<i64, _>(idx).map(SqlValue::Int))
                        .unwrap_or(SqlValue::Null)
                } else {
                    row.try_get::<i64, _>(idx)
                        .map(SqlValue::Int)
                        .or_else(|_| row.try_get::<bool, _>(idx).map(SqlValue::Bool))
                        .unwrap_or(SqlValue::Null)
                }
            }
            "float" => row
                .try_get::<f32, _>(idx)
                .map(|v| SqlValue::Float(v as f64))
                .unwrap_or(SqlValue::Null),
            "double" => row
                .try_get::<f64, _>(idx)
                .map(SqlValue::Float)
                .unwrap_or(SqlValue::Null),
            "decimal" => row
                .try_get::<rust_decimal::Decimal, _>(idx)
                .map(|d| SqlValue::Decimal(d.to_string()))
                .unwrap_or(SqlValue::Null),
            "datetime" | "timestamp" => row
                .try_get::<chrono::NaiveDateTime, _>(idx)
                .map(SqlValue::DateTime)
                .or_else(|_| row.try_get::<String, _>(idx).map(SqlValue::Text))
                .unwrap_or(SqlValue::Null),
            "date" => row
                .try_get::<chrono::NaiveDate, _>(idx)
                .map(SqlValue::Date)
                .or_else(|_| row.try_get::<String, _>(idx).map(SqlValue::Text))
                .unwrap_or(SqlValue::Null),
            "json" => row
                .try_get::<serde_json::Value, _>(idx)
                .map(|v| SqlValue::Text(v.to_string()))
                .or_else(|_| row.try_get::<String, _>(idx).map(SqlValue::Text))
                .unwrap_or(SqlValue::Null),
            // char, varchar, enum, text family and anything else textual
            _ => row
                .try_get::<String, _>(idx)
                .map(SqlValue::Text)
                .unwrap_or(SqlValue::Null),
        }
    }
}

#[async_trait]
impl SourceCatalog for MysqlSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        // BASE TABLE filter leaves views out
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|r| r.get::<String, _>("TABLE_NAME"))
            .collect())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDefinition>> {
        // COLUMN_TYPE carries the full raw type string ("int(11) unsigned"),
        // which the type mapper needs; CAST handles collation differences.
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                IF(EXTRA LIKE '%auto_increment%', 1, 0) AS is_auto_increment
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        let columns: Vec<ColumnDefinition> = rows
            .iter()
            .map(|row| ColumnDefinition {
                name: row.get::<String, _>("COLUMN_NAME"),
                source_type: row.get::<String, _>("COLUMN_TYPE"),
                is_auto_increment: row.get::<i32, _>("is_auto_increment") == 1,
            })
            .collect();

        debug!("{}: {} columns", table, columns.len());
        Ok(columns)
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<IndexRow>> {
        // One row per column per key, in key order; grouping into composite
        // definitions happens downstream.
        let query = r#"
            SELECT
                CAST(INDEX_NAME AS CHAR(255)) AS INDEX_NAME,
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                NON_UNIQUE
            FROM INFORMATION_SCHEMA.STATISTICS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY INDEX_NAME, SEQ_IN_INDEX
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| IndexRow {
                key_name: row.get::<String, _>("INDEX_NAME"),
                column_name: row.get::<String, _>("COLUMN_NAME"),
                non_unique: row.get::<i64, _>("NON_UNIQUE") != 0,
            })
            .collect())
    }

    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyConstraint>> {
        let query = r#"
            SELECT
                CAST(rc.CONSTRAINT_NAME AS CHAR(255)) AS CONSTRAINT_NAME,
                CAST(kcu.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(kcu.REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(kcu.REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME
            FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc
            JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
                ON rc.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                AND rc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
                AND rc.TABLE_NAME = kcu.TABLE_NAME
            WHERE rc.CONSTRAINT_SCHEMA = ? AND rc.TABLE_NAME = ?
            ORDER BY rc.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| ForeignKeyConstraint {
                constraint_name: row.get::<String, _>("CONSTRAINT_NAME"),
                table_name: table.to_string(),
                column_name: row.get::<String, _>("COLUMN_NAME"),
                foreign_table_name: row.get::<String, _>("REFERENCED_TABLE_NAME"),
                foreign_column_name: row.get::<String, _>("REFERENCED_COLUMN_NAME"),
            })
            .collect())
    }

    async fn fetch_page(
        &self,
        table: &str,
        columns: &[ColumnDefinition],
        offset: u64,
        limit: u64,
    ) -> Result<Vec<SourceRow>> {
        let col_list: Vec<String> = columns.iter().map(|c| Self::quote_ident(&c.name)).collect();

        let query = format!(
            "SELECT {} FROM {} LIMIT {} OFFSET {}",
            col_list.join(", "),
            Self::quote_ident(table),
            limit,
            offset
        );

        let rows: Vec<MySqlRow> = sqlx::query(&query).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| Self::decode_field(row, idx, col))
                    .collect()
            })
            .collect())
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", Self::quote_ident(table));
        let row: MySqlRow = sqlx::query(&query).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>(0))
    }
}

/// Lazy, finite, non-restartable sequence of row pages for one table.
///
/// Pages by offset/limit; a page shorter than the limit ends the sequence.
/// An exactly-full last page causes one further fetch that comes back empty.
pub struct RowPager<'a> {
    source: &'a dyn SourceCatalog,
    table: &'a str,
    columns: &'a [ColumnDefinition],
    page_size: u64,
    offset: u64,
    done: bool,
}

impl<'a> RowPager<'a> {
    pub fn new(
        source: &'a dyn SourceCatalog,
        table: &'a str,
        columns: &'a [ColumnDefinition],
        page_size: u64,
    ) -> Self {
        Self {
            source,
            table,
            columns,
            page_size,
            offset: 0,
            done: false,
        }
    }

    /// Fetch the next page, or `None` once the sequence is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<SourceRow>>> {
        if self.done {
            return Ok(None);
        }

        let rows = self
            .source
            .fetch_page(self.table, self.columns, self.offset, self.page_size)
            .await?;

        if (rows.len() as u64) < self.page_size {
            self.done = true;
        }
        self.offset += self.page_size;

        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows))
    }
}
