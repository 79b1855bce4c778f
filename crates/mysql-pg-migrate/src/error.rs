//! Error types for the migration library.

use thiserror::Error;

/// Phases of a migration run, in execution order.
///
/// Used for error context so a failed run reports which phase halted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    CreateTables,
    CreateIndexesAndKeys,
    CreateForeignKeys,
    TransferData,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::CreateTables => "create-tables",
            Phase::CreateIndexesAndKeys => "create-indexes-and-keys",
            Phase::CreateForeignKeys => "create-foreign-keys",
            Phase::TransferData => "transfer-data",
        };
        f.write_str(name)
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// No mapping rule exists for a source column type.
    #[error("Unsupported source type: {0}")]
    UnsupportedType(String),

    /// Auto-increment is only supported on int and bigint columns.
    #[error("Unsupported auto-increment type: {0}")]
    UnsupportedAutoIncrementType(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// A phase failed for a specific table; the phase's transaction was
    /// rolled back and the run halted.
    #[error("Phase {phase} failed for table {table}")]
    Phase {
        phase: Phase,
        table: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// Data transfer failed for a specific table
    #[error("Transfer failed for table {table}: {message}")]
    Transfer { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Wrap an error with the phase and table it occurred in.
    pub fn phase(phase: Phase, table: impl Into<String>, source: MigrateError) -> Self {
        MigrateError::Phase {
            phase,
            table: table.into(),
            source: Box::new(source),
        }
    }

    /// Create a Transfer error
    pub fn transfer(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Transfer {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
