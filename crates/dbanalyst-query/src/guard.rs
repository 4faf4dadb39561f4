//! Read-only statement guard
//!
//! Runs before a statement reaches the database. Comments and quoted text are
//! blanked out first so that `WHERE status = 'deleted'` or a column named in
//! double quotes cannot trip the keyword check.

use once_cell::sync::Lazy;
use regex::Regex;

use dbanalyst_utils::error::QueryError;

/// `replace` is absent: it is also a string function, and `REPLACE INTO`
/// already fails the leading keyword check.
static FORBIDDEN_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(drop|delete|update|insert|alter|create|truncate|attach|detach|pragma|vacuum|reindex)\b",
    )
    .expect("valid regex")
});

static LEADING_KEYWORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\(*\s*([A-Za-z]+)").expect("valid regex"));

/// Check that `sql` is a single read-only query.
///
/// # Errors
///
/// Returns a `rejected` [`QueryError`] naming the reason.
pub fn ensure_read_only(sql: &str) -> Result<(), QueryError> {
    let code = strip_comments_and_literals(sql);
    let trimmed = code.trim();

    if trimmed.is_empty() {
        return Err(QueryError::rejected("empty SQL statement").with_sql(sql));
    }

    let body = trimmed.strip_suffix(';').unwrap_or(trimmed);
    if body.contains(';') {
        return Err(
            QueryError::rejected("only a single statement is allowed per query").with_sql(sql),
        );
    }

    let leading = LEADING_KEYWORD
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_uppercase())
        .unwrap_or_default();
    if leading != "SELECT" && leading != "WITH" {
        return Err(QueryError::rejected(format!(
            "only SELECT queries are allowed, found '{}'",
            if leading.is_empty() { "?" } else { leading.as_str() }
        ))
        .with_sql(sql));
    }

    if let Some(found) = FORBIDDEN_KEYWORD.find(body) {
        return Err(QueryError::rejected(format!(
            "statement contains forbidden keyword '{}'; only SELECT queries are allowed",
            found.as_str().to_ascii_uppercase()
        ))
        .with_sql(sql));
    }

    Ok(())
}

/// Replace comments and quoted sections with spaces, keeping statement shape
fn strip_comments_and_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' => {
                let quote = c;
                out.push(' ');
                while let Some(inner) = chars.next() {
                    if inner == quote {
                        // doubled quote is an escaped quote
                        if chars.peek() == Some(&quote) {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
                out.push(' ');
            }
            '[' => {
                out.push(' ');
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                }
                out.push(' ');
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
                out.push(' ');
            }
            other => out.push(other),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbanalyst_utils::error::QueryErrorKind;

    fn rejected(sql: &str) -> bool {
        matches!(ensure_read_only(sql), Err(e) if e.kind == QueryErrorKind::Rejected)
    }

    #[test]
    fn test_allows_select_and_cte() {
        assert!(ensure_read_only("SELECT COUNT(*) FROM user").is_ok());
        assert!(ensure_read_only("  select name from unit;").is_ok());
        assert!(
            ensure_read_only("WITH t AS (SELECT 1 AS x) SELECT x FROM t").is_ok()
        );
        assert!(ensure_read_only("(SELECT 1) UNION SELECT 2").is_ok());
    }

    #[test]
    fn test_rejects_writes_and_ddl() {
        assert!(rejected("DELETE FROM user"));
        assert!(rejected("update user set name = 'x'"));
        assert!(rejected("INSERT INTO unit VALUES (1)"));
        assert!(rejected("DROP TABLE user"));
        assert!(rejected("PRAGMA writable_schema = 1"));
        assert!(rejected("ATTACH DATABASE 'x.db' AS x"));
        assert!(rejected(
            "WITH gone AS (DELETE FROM user RETURNING *) SELECT * FROM gone"
        ));
    }

    #[test]
    fn test_rejects_multiple_statements() {
        let err = ensure_read_only("SELECT 1; SELECT 2").unwrap_err();
        assert!(err.message.contains("single statement"));
        assert_eq!(err.sql.as_deref(), Some("SELECT 1; SELECT 2"));
    }

    #[test]
    fn test_rejects_empty() {
        assert!(rejected(""));
        assert!(rejected("   -- just a comment\n"));
    }

    #[test]
    fn test_keywords_inside_literals_and_comments_are_ignored() {
        assert!(ensure_read_only("SELECT * FROM session WHERE status = 'deleted'").is_ok());
        assert!(ensure_read_only("SELECT 'drop table user' AS note").is_ok());
        assert!(ensure_read_only("SELECT \"update\" FROM audit").is_ok());
        assert!(ensure_read_only("SELECT 1 -- delete later\n").is_ok());
        assert!(ensure_read_only("SELECT /* insert */ 1").is_ok());
        assert!(ensure_read_only("SELECT 'it''s; fine'").is_ok());
    }

    #[test]
    fn test_replace_function_allowed_but_replace_into_rejected() {
        assert!(ensure_read_only("SELECT REPLACE(name, 'a', 'b') FROM user").is_ok());
        assert!(rejected("REPLACE INTO unit (unit_id, name) VALUES (1, 'x')"));
        assert!(rejected("replace into unit values (1, 'x')"));
    }

    #[test]
    fn test_identifier_containing_keyword_is_allowed() {
        assert!(ensure_read_only("SELECT created_at, updated_by FROM user").is_ok());
    }
}
