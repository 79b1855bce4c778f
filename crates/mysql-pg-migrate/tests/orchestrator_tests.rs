//! Orchestrator integration tests over in-memory collaborators.
//!
//! The mocks record every statement and transaction boundary so the tests
//! can assert phase ordering, idempotent re-runs, rollback scope, and the
//! replica-mode envelope around the transfer phase.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mysql_pg_migrate::{
    ColumnDefinition, ForeignKeyConstraint, IndexRow, MigrateError, MigrationConfig, Orchestrator,
    SourceCatalog, SqlValue, TargetSession,
};

type Row = Vec<SqlValue>;

#[derive(Default)]
struct MockSource {
    tables: Vec<String>,
    columns: HashMap<String, Vec<ColumnDefinition>>,
    indexes: HashMap<String, Vec<IndexRow>>,
    fks: HashMap<String, Vec<ForeignKeyConstraint>>,
    rows: HashMap<String, Vec<Row>>,
    fetch_log: Mutex<Vec<(String, u64, u64)>>,
}

impl MockSource {
    fn fetch_count(&self, table: &str) -> usize {
        self.fetch_log
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _, _)| t == table)
            .count()
    }
}

#[async_trait]
impl SourceCatalog for MockSource {
    async fn list_tables(&self) -> mysql_pg_migrate::Result<Vec<String>> {
        Ok(self.tables.clone())
    }

    async fn describe_columns(
        &self,
        table: &str,
    ) -> mysql_pg_migrate::Result<Vec<ColumnDefinition>> {
        Ok(self.columns.get(table).cloned().unwrap_or_default())
    }

    async fn list_indexes(&self, table: &str) -> mysql_pg_migrate::Result<Vec<IndexRow>> {
        Ok(self.indexes.get(table).cloned().unwrap_or_default())
    }

    async fn list_foreign_keys(
        &self,
        table: &str,
    ) -> mysql_pg_migrate::Result<Vec<ForeignKeyConstraint>> {
        Ok(self.fks.get(table).cloned().unwrap_or_default())
    }

    async fn fetch_page(
        &self,
        table: &str,
        _columns: &[ColumnDefinition],
        offset: u64,
        limit: u64,
    ) -> mysql_pg_migrate::Result<Vec<Row>> {
        self.fetch_log
            .lock()
            .unwrap()
            .push((table.to_string(), offset, limit));

        let rows = self.rows.get(table).cloned().unwrap_or_default();
        let start = (offset as usize).min(rows.len());
        let end = ((offset + limit) as usize).min(rows.len());
        Ok(rows[start..end].to_vec())
    }

    async fn count_rows(&self, table: &str) -> mysql_pg_migrate::Result<i64> {
        Ok(self.rows.get(table).map(|r| r.len()).unwrap_or(0) as i64)
    }
}

/// Recording target session with transactional statement tracking.
#[derive(Default)]
struct MockTarget {
    /// Every call in arrival order: SQL text, or BEGIN/COMMIT/ROLLBACK/REPLICA markers.
    log: Mutex<Vec<String>>,
    /// Parameters per executed statement.
    params_log: Mutex<Vec<(String, Vec<SqlValue>)>>,
    /// Statements whose transaction committed.
    committed: Mutex<Vec<String>>,
    /// Statements in the open transaction.
    pending: Mutex<Vec<String>>,
    /// Fail any execute whose SQL contains this substring.
    fail_on: Option<String>,
    /// Fail every count_rows call.
    fail_count_rows: bool,
}

impl MockTarget {
    fn with_failure(substring: &str) -> Self {
        Self {
            fail_on: Some(substring.to_string()),
            ..Default::default()
        }
    }

    fn with_count_failure() -> Self {
        Self {
            fail_count_rows: true,
            ..Default::default()
        }
    }

    fn log_vec(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn committed_vec(&self) -> Vec<String> {
        self.committed.lock().unwrap().clone()
    }

    fn applied_contains(&self, needle: &str) -> bool {
        self.committed
            .lock()
            .unwrap()
            .iter()
            .chain(self.pending.lock().unwrap().iter())
            .any(|s| s.contains(needle))
    }

    fn count_in_log(&self, needle: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.contains(needle))
            .count()
    }
}

#[async_trait]
impl TargetSession for MockTarget {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> mysql_pg_migrate::Result<u64> {
        if let Some(ref needle) = self.fail_on {
            if sql.contains(needle.as_str()) {
                return Err(MigrateError::Config(format!("injected failure: {}", needle)));
            }
        }

        self.log.lock().unwrap().push(sql.to_string());
        self.params_log
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        self.pending.lock().unwrap().push(sql.to_string());
        Ok(params.len() as u64)
    }

    async fn begin(&self) -> mysql_pg_migrate::Result<()> {
        self.log.lock().unwrap().push("BEGIN".to_string());
        Ok(())
    }

    async fn commit(&self) -> mysql_pg_migrate::Result<()> {
        self.log.lock().unwrap().push("COMMIT".to_string());
        let mut pending = self.pending.lock().unwrap();
        self.committed.lock().unwrap().append(&mut pending);
        Ok(())
    }

    async fn rollback(&self) -> mysql_pg_migrate::Result<()> {
        self.log.lock().unwrap().push("ROLLBACK".to_string());
        self.pending.lock().unwrap().clear();
        Ok(())
    }

    async fn set_replica_mode(&self, enabled: bool) -> mysql_pg_migrate::Result<()> {
        let marker = if enabled { "REPLICA on" } else { "REPLICA off" };
        self.log.lock().unwrap().push(marker.to_string());
        Ok(())
    }

    async fn has_primary_key(&self, table: &str) -> mysql_pg_migrate::Result<bool> {
        Ok(self.applied_contains(&format!("ALTER TABLE \"{}\" ADD PRIMARY KEY", table)))
    }

    async fn foreign_key_exists(
        &self,
        table: &str,
        constraint: &str,
    ) -> mysql_pg_migrate::Result<bool> {
        Ok(self.applied_contains(&format!(
            "ALTER TABLE \"{}\" ADD CONSTRAINT \"{}\"",
            table, constraint
        )))
    }

    async fn count_rows(&self, table: &str) -> mysql_pg_migrate::Result<i64> {
        if self.fail_count_rows {
            return Err(MigrateError::Config(format!(
                "injected count failure: {}",
                table
            )));
        }
        Ok(0)
    }
}

fn col(name: &str, source_type: &str, auto: bool) -> ColumnDefinition {
    ColumnDefinition {
        name: name.to_string(),
        source_type: source_type.to_string(),
        is_auto_increment: auto,
    }
}

fn irow(key: &str, column: &str, non_unique: bool) -> IndexRow {
    IndexRow {
        key_name: key.to_string(),
        column_name: column.to_string(),
        non_unique,
    }
}

fn user_row(id: i64, name: &str) -> Row {
    vec![SqlValue::Int(id), SqlValue::Text(name.to_string())]
}

/// Source with a `users` table (serial PK, name index) and an `orders`
/// table referencing it.
fn sample_source() -> MockSource {
    let mut source = MockSource {
        tables: vec!["users".to_string(), "orders".to_string()],
        ..Default::default()
    };

    source.columns.insert(
        "users".to_string(),
        vec![col("id", "int(11)", true), col("name", "varchar(255)", false)],
    );
    source.indexes.insert(
        "users".to_string(),
        vec![irow("PRIMARY", "id", false), irow("idx_name", "name", true)],
    );
    source.rows.insert(
        "users".to_string(),
        vec![user_row(1, "ana"), user_row(2, "bo")],
    );

    source.columns.insert(
        "orders".to_string(),
        vec![col("id", "int(11)", true), col("user_id", "int(11)", false)],
    );
    source
        .indexes
        .insert("orders".to_string(), vec![irow("PRIMARY", "id", false)]);
    source.fks.insert(
        "orders".to_string(),
        vec![ForeignKeyConstraint {
            constraint_name: "fk_orders_user".to_string(),
            table_name: "orders".to_string(),
            column_name: "user_id".to_string(),
            foreign_table_name: "users".to_string(),
            foreign_column_name: "id".to_string(),
        }],
    );
    source.rows.insert(
        "orders".to_string(),
        vec![vec![SqlValue::Int(1), SqlValue::Int(1)]],
    );

    source
}

fn orchestrator(
    source: Arc<MockSource>,
    target: Arc<MockTarget>,
    migration: MigrationConfig,
) -> Orchestrator {
    Orchestrator::with_collaborators(migration, source, target)
}

fn position_of(log: &[String], needle: &str) -> usize {
    log.iter()
        .position(|s| s.contains(needle))
        .unwrap_or_else(|| panic!("no log entry contains {:?}", needle))
}

#[tokio::test]
async fn full_run_orders_phases_and_commits() {
    let source = Arc::new(sample_source());
    let target = Arc::new(MockTarget::default());
    let orch = orchestrator(source.clone(), target.clone(), MigrationConfig::default());

    let report = orch.run().await.unwrap();
    assert_eq!(report.tables_total, 2);
    assert_eq!(report.rows_transferred, 3);

    let log = target.log_vec();

    // Three transactions, all committed
    assert_eq!(log.iter().filter(|s| *s == "BEGIN").count(), 3);
    assert_eq!(log.iter().filter(|s| *s == "COMMIT").count(), 3);
    assert!(!log.iter().any(|s| s == "ROLLBACK"));

    // Tables before indexes before foreign keys before data
    let create = position_of(&log, "CREATE TABLE IF NOT EXISTS \"orders\"");
    let index = position_of(&log, "CREATE INDEX IF NOT EXISTS \"users_idx_name\"");
    let fk = position_of(&log, "ADD CONSTRAINT \"fk_orders_user\"");
    let insert = position_of(&log, "INSERT INTO \"users\"");
    assert!(create < index && index < fk && fk < insert);

    // Replica mode wraps only the transfer phase
    let replica_on = position_of(&log, "REPLICA on");
    let replica_off = position_of(&log, "REPLICA off");
    assert!(fk < replica_on && replica_on < insert && insert < replica_off);

    // Composite-free PK still issued exactly once per table
    assert_eq!(target.count_in_log("ADD PRIMARY KEY"), 2);
}

#[tokio::test]
async fn skipped_table_is_invisible_to_every_phase() {
    let source = Arc::new(sample_source());
    let target = Arc::new(MockTarget::default());
    let migration = MigrationConfig {
        skip_tables: vec!["orders".to_string()],
        ..Default::default()
    };
    let orch = orchestrator(source.clone(), target.clone(), migration);

    let report = orch.run().await.unwrap();
    assert_eq!(report.tables_total, 1);
    assert_eq!(report.rows_transferred, 2);

    let log = target.log_vec();
    assert!(!log.iter().any(|s| s.contains("\"orders\"")));
    assert_eq!(source.fetch_count("orders"), 0);
}

#[tokio::test]
async fn second_run_issues_no_duplicate_keys_or_constraints() {
    let source = Arc::new(sample_source());
    let target = Arc::new(MockTarget::default());
    let orch = orchestrator(source.clone(), target.clone(), MigrationConfig::default());

    orch.run().await.unwrap();
    orch.run().await.unwrap();

    // Conditioned creations repeat harmlessly; unconditioned additions must not
    assert_eq!(
        target.count_in_log("ALTER TABLE \"users\" ADD PRIMARY KEY"),
        1
    );
    assert_eq!(
        target.count_in_log("ALTER TABLE \"orders\" ADD PRIMARY KEY"),
        1
    );
    assert_eq!(target.count_in_log("ADD CONSTRAINT \"fk_orders_user\""), 1);
    assert_eq!(
        target.count_in_log("CREATE TABLE IF NOT EXISTS \"users\""),
        2
    );
}

#[tokio::test]
async fn composite_primary_key_is_one_statement() {
    let mut source = MockSource {
        tables: vec!["memberships".to_string()],
        ..Default::default()
    };
    source.columns.insert(
        "memberships".to_string(),
        vec![col("user_id", "int(11)", false), col("group_id", "int(11)", false)],
    );
    source.indexes.insert(
        "memberships".to_string(),
        vec![
            irow("PRIMARY", "user_id", false),
            irow("PRIMARY", "group_id", false),
        ],
    );

    let target = Arc::new(MockTarget::default());
    let orch = orchestrator(Arc::new(source), target.clone(), MigrationConfig::default());
    orch.run().await.unwrap();

    assert_eq!(target.count_in_log("ADD PRIMARY KEY"), 1);
    assert!(target
        .log_vec()
        .iter()
        .any(|s| s.contains("ADD PRIMARY KEY (\"user_id\", \"group_id\")")));
}

#[tokio::test]
async fn foreign_key_failure_halts_before_transfer_and_keeps_earlier_commits() {
    let source = Arc::new(sample_source());
    let target = Arc::new(MockTarget::with_failure("ADD CONSTRAINT"));
    let orch = orchestrator(source.clone(), target.clone(), MigrationConfig::default());

    let err = orch.run().await.unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("create-foreign-keys"));
    assert!(rendered.contains("orders"));

    // Tables and indexes stay committed
    let committed = target.committed_vec();
    assert!(committed
        .iter()
        .any(|s| s.contains("CREATE TABLE IF NOT EXISTS \"users\"")));

    // The foreign-key transaction rolled back; transfer never started
    let log = target.log_vec();
    assert_eq!(log.iter().filter(|s| *s == "ROLLBACK").count(), 1);
    assert!(!log.iter().any(|s| s.contains("INSERT INTO")));
    assert!(!log.iter().any(|s| s == "REPLICA on"));
    assert_eq!(source.fetch_count("users"), 0);
}

#[tokio::test]
async fn transfer_failure_rolls_back_and_lifts_replica_mode() {
    let source = Arc::new(sample_source());
    let target = Arc::new(MockTarget::with_failure("INSERT INTO"));
    let orch = orchestrator(source.clone(), target.clone(), MigrationConfig::default());

    let err = orch.run().await.unwrap_err();
    assert!(err.to_string().contains("transfer-data"));

    let log = target.log_vec();
    assert_eq!(log.iter().filter(|s| *s == "ROLLBACK").count(), 1);

    // Suspension lifted unconditionally after the phase, failure included
    assert_eq!(log.last().map(String::as_str), Some("REPLICA off"));

    // Schema commits from earlier phases stand
    assert!(target
        .committed_vec()
        .iter()
        .any(|s| s.contains("ADD CONSTRAINT \"fk_orders_user\"")));
}

#[tokio::test]
async fn pagination_stops_after_short_page_and_probes_after_full_page() {
    let mut source = MockSource {
        tables: vec!["full_page".to_string(), "short_page".to_string()],
        ..Default::default()
    };
    let cols = vec![col("id", "int(11)", false)];
    source.columns.insert("full_page".to_string(), cols.clone());
    source.columns.insert("short_page".to_string(), cols);
    source.rows.insert(
        "full_page".to_string(),
        (0..5).map(|i| vec![SqlValue::Int(i)]).collect(),
    );
    source.rows.insert(
        "short_page".to_string(),
        (0..3).map(|i| vec![SqlValue::Int(i)]).collect(),
    );

    let source = Arc::new(source);
    let target = Arc::new(MockTarget::default());
    let migration = MigrationConfig {
        page_size: Some(5),
        batch_size: Some(2),
        ..Default::default()
    };
    let orch = orchestrator(source.clone(), target.clone(), migration);
    let report = orch.run().await.unwrap();
    assert_eq!(report.rows_transferred, 8);

    // Exactly limit rows: one full fetch plus one empty probe
    assert_eq!(source.fetch_count("full_page"), 2);
    // Fewer than limit: a single fetch suffices
    assert_eq!(source.fetch_count("short_page"), 1);

    // 5 rows at batch size 2 -> batches of 2, 2, 1
    assert_eq!(target.count_in_log("INSERT INTO \"full_page\""), 3);
}

#[tokio::test]
async fn conflict_clause_uses_primary_key_when_known() {
    let source = Arc::new(sample_source());
    let target = Arc::new(MockTarget::default());
    let orch = orchestrator(source, target.clone(), MigrationConfig::default());
    orch.run().await.unwrap();

    let log = target.log_vec();
    let users_insert = log
        .iter()
        .find(|s| s.contains("INSERT INTO \"users\""))
        .unwrap();
    assert!(users_insert.ends_with("ON CONFLICT (\"id\") DO NOTHING"));
}

#[tokio::test]
async fn conflict_clause_is_bare_without_primary_key() {
    let mut source = MockSource {
        tables: vec!["log_lines".to_string()],
        ..Default::default()
    };
    source.columns.insert(
        "log_lines".to_string(),
        vec![col("msg", "text", false)],
    );
    source.rows.insert(
        "log_lines".to_string(),
        vec![vec![SqlValue::Text("hello".to_string())]],
    );

    let target = Arc::new(MockTarget::default());
    let orch = orchestrator(Arc::new(source), target.clone(), MigrationConfig::default());
    orch.run().await.unwrap();

    let log = target.log_vec();
    let insert = log.iter().find(|s| s.contains("INSERT INTO")).unwrap();
    assert!(insert.ends_with("ON CONFLICT DO NOTHING"));
}

#[tokio::test]
async fn insert_placeholders_stay_text_typed_under_casts() {
    let source = Arc::new(sample_source());
    let target = Arc::new(MockTarget::default());
    let orch = orchestrator(source, target.clone(), MigrationConfig::default());
    orch.run().await.unwrap();

    // Parameters are bound as text; a bare ::integer placeholder would make
    // the prepared statement expect int4 and reject the binding. The text
    // pin keeps the conversion server-side.
    let log = target.log_vec();
    let users_insert = log
        .iter()
        .find(|s| s.contains("INSERT INTO \"users\""))
        .unwrap();
    assert!(users_insert.contains("($1::text::integer, $2::varchar)"));
    assert!(!users_insert.contains("$1::integer"));

    let orders_insert = log
        .iter()
        .find(|s| s.contains("INSERT INTO \"orders\""))
        .unwrap();
    assert!(orders_insert.contains("($1::text::integer, $2::text::integer)"));
}

#[tokio::test]
async fn invalid_timestamp_binds_as_null() {
    let mut source = MockSource {
        tables: vec!["events".to_string()],
        ..Default::default()
    };
    source.columns.insert(
        "events".to_string(),
        vec![col("id", "int(11)", false), col("seen_at", "datetime", false)],
    );
    source.rows.insert(
        "events".to_string(),
        vec![vec![
            SqlValue::Int(1),
            SqlValue::Text("0000-00-00 00:00:00".to_string()),
        ]],
    );

    let target = Arc::new(MockTarget::default());
    let orch = orchestrator(Arc::new(source), target.clone(), MigrationConfig::default());
    orch.run().await.unwrap();

    let params_log = target.params_log.lock().unwrap();
    let (_, params) = params_log
        .iter()
        .find(|(sql, _)| sql.contains("INSERT INTO \"events\""))
        .unwrap();
    assert_eq!(params[0], SqlValue::Int(1));
    assert_eq!(params[1], SqlValue::Null);
}

#[tokio::test]
async fn unsupported_column_type_aborts_create_tables_phase() {
    let mut source = MockSource {
        tables: vec!["spatial".to_string()],
        ..Default::default()
    };
    source.columns.insert(
        "spatial".to_string(),
        vec![col("shape", "geometry", false)],
    );

    let target = Arc::new(MockTarget::default());
    let orch = orchestrator(Arc::new(source), target.clone(), MigrationConfig::default());

    let err = orch.run().await.unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("create-tables"));
    assert!(rendered.contains("spatial"));

    let log = target.log_vec();
    assert_eq!(log.iter().filter(|s| *s == "ROLLBACK").count(), 1);
    assert!(target.committed_vec().is_empty());
}

#[tokio::test]
async fn validate_reports_row_count_mismatches() {
    let source = Arc::new(sample_source());
    // MockTarget::count_rows always reports 0 rows
    let target = Arc::new(MockTarget::default());
    let orch = orchestrator(source, target, MigrationConfig::default());

    let checks = orch.validate().await.unwrap();
    assert_eq!(checks.len(), 2);
    let users = checks.iter().find(|c| c.table == "users").unwrap();
    assert_eq!(users.source_rows, 2);
    assert_eq!(users.target_rows, 0);
    assert!(!users.matches);
}

#[tokio::test]
async fn validate_surfaces_target_count_errors() {
    let source = Arc::new(sample_source());
    let target = Arc::new(MockTarget::with_count_failure());
    let orch = orchestrator(source, target, MigrationConfig::default());

    // A target that cannot be counted is an error, not a zero-row mismatch
    let err = orch.validate().await.unwrap_err();
    assert!(err.to_string().contains("injected count failure"));
}
