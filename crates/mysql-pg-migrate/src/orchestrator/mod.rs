//! Migration orchestrator - sequences the phases of a run.
//!
//! Fixed phase order over one precomputed table plan:
//!
//! 1. CreateTables and CreateIndexesAndKeys, committed together
//! 2. CreateForeignKeys, committed independently
//! 3. TransferData, inside its own transaction with session replica mode
//!    active for the whole phase
//!
//! A phase failure rolls back that phase's transaction and halts the run;
//! earlier phase commits stand. The skip set is applied once when the plan
//! is built, so a skipped table is invisible to every phase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::config::{Config, MigrationConfig};
use crate::ddl;
use crate::error::{MigrateError, Phase, Result};
use crate::schema::{group_index_rows, TableSchema};
use crate::source::{MysqlSource, SourceCatalog};
use crate::target::{PgSession, TargetSession};
use crate::transfer::{TransferConfig, TransferEngine};

/// Result of a completed migration run. A failed run surfaces as an error
/// instead, so a report always describes a completed migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables in the migration plan.
    pub tables_total: usize,

    /// Total rows read from the source during transfer.
    pub rows_transferred: i64,
}

impl MigrationReport {
    /// Convert to a pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Per-table result of a row-count validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowCountCheck {
    pub table: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

/// Migration orchestrator.
pub struct Orchestrator {
    migration: MigrationConfig,
    source: Arc<dyn SourceCatalog>,
    target: Arc<dyn TargetSession>,
}

impl Orchestrator {
    /// Connect both collaborators and build an orchestrator.
    pub async fn connect(config: Config) -> Result<Self> {
        let source = MysqlSource::connect(&config.source).await?;
        let target = PgSession::connect(&config.target).await?;

        Ok(Self {
            migration: config.migration,
            source: Arc::new(source),
            target: Arc::new(target),
        })
    }

    /// Build an orchestrator over caller-supplied collaborators.
    pub fn with_collaborators(
        migration: MigrationConfig,
        source: Arc<dyn SourceCatalog>,
        target: Arc<dyn TargetSession>,
    ) -> Self {
        Self {
            migration,
            source,
            target,
        }
    }

    /// Run the migration to completion.
    pub async fn run(&self) -> Result<MigrationReport> {
        let started_at = Utc::now();

        // The plan is computed once and reused by every phase: same table
        // membership, same catalog order.
        let plan = self.build_plan().await?;
        info!("Migrating {} tables", plan.len());

        // Phase 1+2: tables, then indexes and primary keys, one transaction
        self.target.begin().await?;
        let schema_result = async {
            self.create_tables(&plan).await?;
            self.create_indexes_and_keys(&plan).await
        }
        .await;
        self.finish_transaction(schema_result).await?;

        // Phase 3: foreign keys, committed independently
        self.target.begin().await?;
        let fk_result = self.create_foreign_keys(&plan).await;
        self.finish_transaction(fk_result).await?;

        // Phase 4: data, under session replica mode for the whole phase
        let rows_transferred = self.run_transfer_phase(&plan).await?;

        let completed_at = Utc::now();
        let report = MigrationReport {
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables_total: plan.len(),
            rows_transferred,
        };

        info!(
            "Migration completed: {} tables, {} rows in {:.1}s",
            report.tables_total, report.rows_transferred, report.duration_seconds
        );

        Ok(report)
    }

    /// Compute the migration plan: catalog order minus the skip set.
    async fn build_plan(&self) -> Result<Vec<String>> {
        let tables = self.source.list_tables().await?;
        Ok(tables
            .into_iter()
            .filter(|t| {
                if self.migration.is_skipped(t) {
                    info!("{}: in skip set, excluded from all phases", t);
                    false
                } else {
                    true
                }
            })
            .collect())
    }

    async fn create_tables(&self, plan: &[String]) -> Result<()> {
        for table in plan {
            let columns = self
                .source
                .describe_columns(table)
                .await
                .map_err(|e| MigrateError::phase(Phase::CreateTables, table, e))?;

            let schema = TableSchema {
                name: table.clone(),
                columns,
            };

            let sql = ddl::build_create_table(&schema)
                .map_err(|e| MigrateError::phase(Phase::CreateTables, table, e))?;
            debug!("{}", sql);

            self.target
                .execute(&sql, &[])
                .await
                .map_err(|e| MigrateError::phase(Phase::CreateTables, table, e))?;

            info!("{}: table ready", table);
        }
        Ok(())
    }

    async fn create_indexes_and_keys(&self, plan: &[String]) -> Result<()> {
        let phase = Phase::CreateIndexesAndKeys;

        for table in plan {
            let rows = self
                .source
                .list_indexes(table)
                .await
                .map_err(|e| MigrateError::phase(phase, table, e))?;
            let groups = group_index_rows(&rows);

            for index in &groups.indexes {
                let sql = ddl::build_create_index(table, index);
                debug!("{}", sql);
                self.target
                    .execute(&sql, &[])
                    .await
                    .map_err(|e| MigrateError::phase(phase, table, e))?;
            }

            // ADD PRIMARY KEY has no IF NOT EXISTS form; the catalog check
            // is what makes re-runs safe.
            if !groups.primary_key.is_empty() {
                let present = self
                    .target
                    .has_primary_key(table)
                    .await
                    .map_err(|e| MigrateError::phase(phase, table, e))?;

                if present {
                    debug!("{}: primary key already present", table);
                } else {
                    let sql = ddl::build_add_primary_key(table, &groups.primary_key);
                    debug!("{}", sql);
                    self.target
                        .execute(&sql, &[])
                        .await
                        .map_err(|e| MigrateError::phase(phase, table, e))?;
                }
            }

            info!(
                "{}: {} indexes, primary key ({})",
                table,
                groups.indexes.len(),
                groups.primary_key.join(", ")
            );
        }
        Ok(())
    }

    async fn create_foreign_keys(&self, plan: &[String]) -> Result<()> {
        let phase = Phase::CreateForeignKeys;

        for table in plan {
            let fks = self
                .source
                .list_foreign_keys(table)
                .await
                .map_err(|e| MigrateError::phase(phase, table, e))?;

            for fk in &fks {
                let present = self
                    .target
                    .foreign_key_exists(table, &fk.constraint_name)
                    .await
                    .map_err(|e| MigrateError::phase(phase, table, e))?;

                if present {
                    info!(
                        "{}: foreign key {} already exists, skipping",
                        table, fk.constraint_name
                    );
                    continue;
                }

                let sql = ddl::build_add_foreign_key(fk);
                debug!("{}", sql);
                self.target
                    .execute(&sql, &[])
                    .await
                    .map_err(|e| MigrateError::phase(phase, table, e))?;
            }

            if !fks.is_empty() {
                info!("{}: {} foreign keys applied", table, fks.len());
            }
        }
        Ok(())
    }

    /// Transfer phase: replica mode on, one transaction around all tables,
    /// replica mode lifted unconditionally afterwards.
    async fn run_transfer_phase(&self, plan: &[String]) -> Result<i64> {
        self.target.set_replica_mode(true).await?;

        let result = match self.target.begin().await {
            Ok(()) => {
                let transfer_result = self.transfer_data(plan).await;
                self.finish_transaction(transfer_result).await
            }
            Err(e) => Err(e),
        };

        // Lifted unconditionally, success or failure: the session outlives
        // the transfer transaction.
        if let Err(e) = self.target.set_replica_mode(false).await {
            warn!("Failed to restore session_replication_role: {}", e);
        }

        result
    }

    async fn transfer_data(&self, plan: &[String]) -> Result<i64> {
        let engine = TransferEngine::new(TransferConfig {
            page_size: self.migration.get_page_size(),
            batch_size: self.migration.get_batch_size(),
        });

        let mut total: i64 = 0;
        for table in plan {
            let rows = engine
                .copy_table(self.source.as_ref(), self.target.as_ref(), table)
                .await
                .map_err(|e| MigrateError::phase(Phase::TransferData, table, e))?;
            total += rows;
        }
        Ok(total)
    }

    /// Close the open phase transaction: commit on success, roll back on
    /// failure and propagate the phase error. Earlier phase commits stand.
    async fn finish_transaction<T>(&self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.target.commit().await?;
                Ok(value)
            }
            Err(e) => {
                error!("{}", e);
                if let Err(rb) = self.target.rollback().await {
                    warn!("Rollback failed: {}", rb);
                }
                Err(e)
            }
        }
    }

    /// Compare per-table row counts between source and target.
    pub async fn validate(&self) -> Result<Vec<RowCountCheck>> {
        let plan = self.build_plan().await?;
        let mut checks = Vec::with_capacity(plan.len());

        for table in &plan {
            let source_rows = self.source.count_rows(table).await?;
            let target_rows = self.target.count_rows(table).await?;
            let matches = source_rows == target_rows;

            if matches {
                info!("{}: {} rows (match)", table, source_rows);
            } else {
                warn!(
                    "{}: source={} target={} (MISMATCH)",
                    table, source_rows, target_rows
                );
            }

            checks.push(RowCountCheck {
                table: table.clone(),
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(checks)
    }
}
