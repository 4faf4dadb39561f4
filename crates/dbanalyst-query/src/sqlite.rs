//! SQLite implementation of [`QueryBackend`]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::Value;
use tracing::{debug, warn};

use dbanalyst_utils::error::{DatabaseError, QueryError, QueryErrorKind};

use crate::guard::ensure_read_only;
use crate::schema::SchemaDescription;
use crate::{QueryBackend, QueryRows, Record};

/// Rows kept from one result set
pub const DEFAULT_ROW_LIMIT: usize = 10_000;

/// VM instructions between deadline checks
const PROGRESS_OPS: i32 = 1_000;

/// Read-only SQLite backend.
///
/// The connection sits behind `Arc<Mutex<_>>` and every statement runs on the
/// blocking pool, so concurrent sessions queue on the mutex instead of
/// blocking the runtime.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
    query_timeout: Duration,
    row_limit: usize,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("path", &self.path)
            .field("query_timeout", &self.query_timeout)
            .field("row_limit", &self.row_limit)
            .finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Open `path` read-only.
    ///
    /// # Errors
    ///
    /// `NotFound` when the file does not exist, `Open` when it cannot be opened
    /// or is not a SQLite database.
    pub fn open(path: &Path, query_timeout: Duration) -> Result<Self, DatabaseError> {
        if !path.is_file() {
            return Err(DatabaseError::NotFound {
                path: path.display().to_string(),
            });
        }

        let open_error = |e: rusqlite::Error| DatabaseError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        };

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(open_error)?;

        // Forces the header to be read so a non-database file fails here
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(open_error)?;

        debug!(path = %path.display(), "Opened database read-only");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
            query_timeout,
            row_limit: DEFAULT_ROW_LIMIT,
        })
    }

    #[must_use]
    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit.max(1);
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Structured schema of the open database
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::Introspection` when the catalog cannot be read.
    pub async fn schema(&self) -> Result<SchemaDescription, DatabaseError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| DatabaseError::Introspection(format!("mutex poisoned: {e}")))?;
            SchemaDescription::introspect(&guard)
                .map_err(|e| DatabaseError::Introspection(e.to_string()))
        })
        .await
        .map_err(|e| DatabaseError::Introspection(format!("spawn_blocking failed: {e}")))?
    }
}

#[async_trait]
impl QueryBackend for SqliteBackend {
    async fn execute(&self, sql: &str) -> Result<QueryRows, QueryError> {
        ensure_read_only(sql)?;

        let conn = Arc::clone(&self.conn);
        let statement = sql.to_string();
        let row_limit = self.row_limit;
        let deadline = Instant::now() + self.query_timeout;
        let timeout = self.query_timeout;

        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| QueryError::runtime(format!("database connection poisoned: {e}")))?;

            guard.progress_handler(PROGRESS_OPS, Some(move || Instant::now() >= deadline));
            let result = read_rows(&guard, &statement, row_limit);
            guard.progress_handler(0, None::<fn() -> bool>);

            result.map_err(|e| classify_error(&e, timeout).with_sql(statement.as_str()))
        })
        .await
        .map_err(|e| QueryError::runtime(format!("query task failed: {e}")))?
    }

    async fn describe_schema(&self) -> Result<String, DatabaseError> {
        Ok(self.schema().await?.to_string())
    }
}

/// Error type internal to row reading
enum ReadError {
    Sqlite(rusqlite::Error),
    NotReadOnly,
}

impl From<rusqlite::Error> for ReadError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

fn read_rows(conn: &Connection, sql: &str, row_limit: usize) -> Result<QueryRows, ReadError> {
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(ReadError::NotReadOnly);
    }

    let columns = unique_column_names(&stmt.column_names());
    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    let mut truncated = false;

    while let Some(row) = rows.next()? {
        if records.len() == row_limit {
            warn!(row_limit, "Result set truncated");
            truncated = true;
            break;
        }
        let mut record = Record::new();
        for (i, column) in columns.iter().enumerate() {
            record.insert(column.clone(), value_to_json(row.get_ref(i)?));
        }
        records.push(record);
    }

    Ok(QueryRows {
        columns,
        rows: records,
        truncated,
    })
}

fn classify_error(error: &ReadError, timeout: Duration) -> QueryError {
    match error {
        ReadError::NotReadOnly => QueryError::rejected("statement would modify the database"),
        ReadError::Sqlite(rusqlite::Error::SqliteFailure(failure, _))
            if failure.code == ErrorCode::OperationInterrupted =>
        {
            QueryError::timeout(timeout)
        }
        ReadError::Sqlite(e) => {
            let message = e.to_string();
            QueryError::new(classify_message(&message), message)
        }
    }
}

/// Map a SQLite error message onto a [`QueryErrorKind`]
#[must_use]
pub fn classify_message(message: &str) -> QueryErrorKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("no such table")
        || lower.contains("no such column")
        || lower.contains("no such function")
        || lower.contains("no such view")
    {
        QueryErrorKind::MissingObject
    } else if lower.contains("syntax error")
        || lower.contains("incomplete input")
        || lower.contains("unrecognized token")
        || lower.contains("ambiguous column name")
        || lower.contains("wrong number of arguments")
        || lower.contains("misuse of aggregate")
    {
        QueryErrorKind::Syntax
    } else if lower.contains("interrupted") {
        QueryErrorKind::Timeout
    } else if lower.contains("readonly") || lower.contains("read-only") {
        QueryErrorKind::Rejected
    } else {
        QueryErrorKind::Runtime
    }
}

fn unique_column_names(names: &[&str]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = (*name).to_string();
        let mut n = 2;
        while columns.contains(&candidate) {
            candidate = format!("{name}_{n}");
            n += 1;
        }
        columns.push(candidate);
    }
    columns
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<blob {} bytes>", bytes.len())),
    }
}

/// Render a value for the schema's sample lines
pub(crate) fn value_to_display(value: ValueRef<'_>) -> String {
    match value_to_json(value) {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s,
        other => other.to_string(),
    }
}
