//! Target session: trait seam plus the PostgreSQL implementation.
//!
//! The whole run shares one session. That is what makes the transactional
//! phase boundaries meaningful and lets the session-scoped
//! `session_replication_role` setting cover the entire transfer phase
//! without per-statement toggling.

use async_trait::async_trait;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::error::Result;
use crate::value::SqlValue;

/// Write access to the target database over a single shared session.
#[async_trait]
pub trait TargetSession: Send + Sync {
    /// Execute one statement with positional parameters; returns rows affected.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Open a transaction on the session.
    async fn begin(&self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&self) -> Result<()>;

    /// Toggle session-scoped constraint-trigger suspension (replica mode).
    async fn set_replica_mode(&self, enabled: bool) -> Result<()>;

    /// Whether the table already has a primary key, per the target catalog.
    async fn has_primary_key(&self, table: &str) -> Result<bool>;

    /// Whether a foreign-key constraint with this name exists on the table.
    async fn foreign_key_exists(&self, table: &str, constraint: &str) -> Result<bool>;

    /// Total row count for a table (used by post-run validation).
    async fn count_rows(&self, table: &str) -> Result<i64>;
}

/// PostgreSQL target session over a single `tokio-postgres` client.
pub struct PgSession {
    client: Client,
}

impl PgSession {
    /// Connect to the target and verify the connection.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let (client, connection) =
            tokio_postgres::connect(&config.connection_string(), NoTls).await?;

        // The connection object drives the socket; it runs until the client
        // is dropped.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("PostgreSQL connection error: {}", e);
            }
        });

        client.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self { client })
    }
}

#[async_trait]
impl TargetSession for PgSession {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let owned: Vec<Option<String>> = params.iter().map(|v| v.to_param()).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            owned.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let affected = self.client.execute(sql, &refs).await?;
        Ok(affected)
    }

    async fn begin(&self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        self.client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn set_replica_mode(&self, enabled: bool) -> Result<()> {
        let role = if enabled { "replica" } else { "origin" };
        self.client
            .batch_execute(&format!("SET session_replication_role = '{}'", role))
            .await?;
        debug!("session_replication_role = {}", role);
        Ok(())
    }

    async fn has_primary_key(&self, table: &str) -> Result<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.table_constraints
                    WHERE table_schema = current_schema()
                      AND table_name = $1
                      AND constraint_type = 'PRIMARY KEY'
                )",
                &[&table],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn foreign_key_exists(&self, table: &str, constraint: &str) -> Result<bool> {
        let row = self
            .client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM information_schema.table_constraints
                    WHERE table_schema = current_schema()
                      AND table_name = $1
                      AND constraint_name = $2
                      AND constraint_type = 'FOREIGN KEY'
                )",
                &[&table, &constraint],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", crate::ddl::quote_ident(table));
        let row = self.client.query_one(&sql, &[]).await?;
        Ok(row.get(0))
    }
}
