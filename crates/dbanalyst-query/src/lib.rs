//! Query capability for dbanalyst
//!
//! [`QueryBackend`] is the seam the engine executes SQL through. The shipped
//! implementation is [`SqliteBackend`], which opens the database read-only,
//! refuses anything but a single `SELECT`/`WITH` statement and classifies
//! failures into [`QueryErrorKind`]s the correction loop can act on.

pub mod guard;
pub mod schema;
mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use dbanalyst_utils::error::{DatabaseError, QueryError, QueryErrorKind};
pub use schema::{SchemaDescription, TableInfo};
pub use sqlite::{DEFAULT_ROW_LIMIT, SqliteBackend, classify_message};

/// One JSON object per row, keyed by column name
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Rows returned by a successful query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRows {
    /// Column names in select-list order; duplicates are suffixed `_2`, `_3`, ...
    pub columns: Vec<String>,
    pub rows: Vec<Record>,
    /// The backend stopped at its row limit; more rows matched
    #[serde(default)]
    pub truncated: bool,
}

impl QueryRows {
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Executes SQL against the target store
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Run one statement and return its rows.
    ///
    /// # Errors
    ///
    /// Returns a classified [`QueryError`]; the backend does not retry.
    async fn execute(&self, sql: &str) -> Result<QueryRows, QueryError>;

    /// Text description of the schema handed to the SQL generator.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Introspection`] when the catalog cannot be read.
    async fn describe_schema(&self) -> Result<String, DatabaseError>;
}
