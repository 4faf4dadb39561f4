//! Schema introspection
//!
//! Produces the "known schema" text: every table and view with its `CREATE`
//! statement, row count and a few sample rows.

use std::fmt;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::sqlite::value_to_display;

/// Sample rows collected per table
pub const SAMPLE_ROWS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    /// `table` or `view`
    pub kind: String,
    pub create_sql: String,
    pub row_count: u64,
    pub columns: Vec<String>,
    pub samples: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub tables: Vec<TableInfo>,
}

impl SchemaDescription {
    /// Read the catalog of an open connection
    pub fn introspect(conn: &Connection) -> rusqlite::Result<Self> {
        let mut stmt = conn.prepare(
            "SELECT name, type, COALESCE(sql, '') FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY type, name",
        )?;
        let entries = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut tables = Vec::with_capacity(entries.len());
        for (name, kind, create_sql) in entries {
            let quoted = quote_identifier(&name);

            let row_count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {quoted}"), [], |row| row.get(0))?;

            let mut sample_stmt =
                conn.prepare(&format!("SELECT * FROM {quoted} LIMIT {SAMPLE_ROWS}"))?;
            let columns: Vec<String> = sample_stmt
                .column_names()
                .into_iter()
                .map(str::to_string)
                .collect();
            let column_count = columns.len();
            let samples = sample_stmt
                .query_map([], |row| {
                    (0..column_count)
                        .map(|i| row.get_ref(i).map(value_to_display))
                        .collect::<rusqlite::Result<Vec<_>>>()
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            tables.push(TableInfo {
                name,
                kind,
                create_sql,
                row_count: u64::try_from(row_count).unwrap_or(0),
                columns,
                samples,
            });
        }

        Ok(Self { tables })
    }
}

impl fmt::Display for SchemaDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tables.is_empty() {
            return writeln!(f, "-- (database has no tables)");
        }
        for table in &self.tables {
            let label = if table.kind == "view" { "VIEW" } else { "TABLE" };
            writeln!(f, "-- {label}: {} ({} records)", table.name, table.row_count)?;
            writeln!(f, "{};", table.create_sql.trim_end_matches(';'))?;
            if !table.samples.is_empty() {
                writeln!(f, "-- SAMPLE DATA:")?;
                writeln!(f, "-- Columns: {}", table.columns.join(", "))?;
                for (i, sample) in table.samples.iter().enumerate() {
                    writeln!(f, "-- Sample {}: {}", i + 1, sample.join(", "))?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
