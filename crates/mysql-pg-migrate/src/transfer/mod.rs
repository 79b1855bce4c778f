//! Data transfer engine: paginated read, batched conflict-tolerant write.
//!
//! Reads one page of rows at a time from the source and writes it in
//! fixed-size batches, one multi-row parameterized insert per batch, awaited
//! to completion before the next is issued. Memory stays bounded to a single
//! page. Uniqueness conflicts are skipped via `ON CONFLICT ... DO NOTHING`;
//! referential ordering is irrelevant because the orchestrator runs the
//! whole phase under session replica mode.

use tracing::{debug, info};

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_PAGE_SIZE};
use crate::ddl::quote_ident;
use crate::error::{MigrateError, Result};
use crate::schema::group_index_rows;
use crate::source::{RowPager, SourceCatalog};
use crate::target::TargetSession;
use crate::typemap::{mysql_to_postgres, PgType};
use crate::value::{normalize, SqlValue};

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Rows fetched per source page.
    pub page_size: u64,

    /// Rows per insert batch.
    pub batch_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Build one multi-row insert with positional parameters and a conflict
/// clause. `casts` aligns with `cols`; `row_count` is the number of rows in
/// the batch.
pub fn build_insert_sql(
    table: &str,
    cols: &[String],
    casts: &[&'static str],
    primary_key: &[String],
    row_count: usize,
) -> String {
    let col_list: Vec<String> = cols.iter().map(|c| quote_ident(c)).collect();

    let mut placeholders = Vec::with_capacity(row_count);
    let mut idx = 1;
    for _ in 0..row_count {
        let row: Vec<String> = casts
            .iter()
            .map(|cast| {
                let p = format!("${}{}", idx, cast);
                idx += 1;
                p
            })
            .collect();
        placeholders.push(format!("({})", row.join(", ")));
    }

    let conflict = if primary_key.is_empty() {
        "ON CONFLICT DO NOTHING".to_string()
    } else {
        let pk_list: Vec<String> = primary_key.iter().map(|c| quote_ident(c)).collect();
        format!("ON CONFLICT ({}) DO NOTHING", pk_list.join(", "))
    };

    format!(
        "INSERT INTO {} ({}) VALUES {} {}",
        quote_ident(table),
        col_list.join(", "),
        placeholders.join(", "),
        conflict
    )
}

/// Transfer engine for moving one table's rows from source to target.
pub struct TransferEngine {
    config: TransferConfig,
}

impl TransferEngine {
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// Copy all rows of `table` from source to target.
    ///
    /// Returns the number of rows read from the source; rows discarded by
    /// the conflict clause are not subtracted. A failing batch aborts the
    /// table's transfer; the enclosing transaction is the orchestrator's.
    pub async fn copy_table(
        &self,
        source: &dyn SourceCatalog,
        target: &dyn TargetSession,
        table: &str,
    ) -> Result<i64> {
        let columns = source.describe_columns(table).await?;
        if columns.is_empty() {
            debug!("{}: no columns, nothing to transfer", table);
            return Ok(0);
        }

        let target_types: Vec<PgType> = columns
            .iter()
            .map(|c| {
                let extra = if c.is_auto_increment { "auto_increment" } else { "" };
                mysql_to_postgres(&c.source_type, extra)
            })
            .collect::<Result<_>>()?;
        let casts: Vec<&'static str> = target_types.iter().map(|t| t.param_cast()).collect();
        let col_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let primary_key = group_index_rows(&source.list_indexes(table).await?).primary_key;

        let mut pager = RowPager::new(source, table, &columns, self.config.page_size);
        let mut rows_read: i64 = 0;

        while let Some(page) = pager.next_page().await? {
            for batch in page.chunks(self.config.batch_size) {
                let sql = build_insert_sql(table, &col_names, &casts, &primary_key, batch.len());

                let params: Vec<SqlValue> = batch
                    .iter()
                    .flat_map(|row| {
                        row.iter()
                            .zip(&target_types)
                            .map(|(value, ty)| normalize(value.clone(), ty))
                    })
                    .collect();

                target
                    .execute(&sql, &params)
                    .await
                    .map_err(|e| MigrateError::transfer(table, e.to_string()))?;

                rows_read += batch.len() as i64;
            }
            debug!("{}: {} rows so far", table, rows_read);
        }

        info!("{}: transferred {} rows", table, rows_read);
        Ok(rows_read)
    }
}
