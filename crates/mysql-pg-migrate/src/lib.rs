//! # mysql-pg-migrate
//!
//! MySQL to PostgreSQL schema and data migration library.
//!
//! This library migrates a relational schema and its data from MySQL to
//! PostgreSQL:
//!
//! - **Schema introspection** via `INFORMATION_SCHEMA`
//! - **Type mapping** from raw MySQL column types to PostgreSQL types
//! - **Idempotent DDL** (tables, indexes, primary keys, foreign keys)
//! - **Batched data transfer** with conflict-tolerant inserts
//! - **Transactional phases** so a failed run never leaves a half-applied phase
//!
//! ## Example
//!
//! ```rust,no_run
//! use mysql_pg_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(config).await?;
//!     let report = orchestrator.run().await?;
//!     println!("Migrated {} rows", report.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod ddl;
pub mod error;
pub mod orchestrator;
pub mod schema;
pub mod source;
pub mod target;
pub mod transfer;
pub mod typemap;
pub mod value;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Phase, Result};
pub use orchestrator::{MigrationReport, Orchestrator, RowCountCheck};
pub use schema::{ColumnDefinition, ForeignKeyConstraint, IndexDefinition, IndexRow, TableSchema};
pub use source::{MysqlSource, RowPager, SourceCatalog};
pub use target::{PgSession, TargetSession};
pub use transfer::{TransferConfig, TransferEngine};
pub use typemap::{mysql_to_postgres, PgType};
pub use value::SqlValue;
