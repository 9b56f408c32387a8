//! Statement parameters and result rows
//!
//! Callers hand values to the engine either by position or by name. Both shapes
//! are resolved against the prepared statement here, before anything reaches
//! SQLite, so a mismatch surfaces as [`Error::Parameter`] instead of a silently
//! NULL-bound column.

use rusqlite::Statement;
use serde_json::{Map, Value as JsonValue};

use crate::error::{Error, Result};

pub use rusqlite::types::Value;

/// Sigils SQLite accepts in front of a named parameter
const NAMED_SIGILS: [char; 3] = [':', '@', '$'];

/// Values bound to a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// Bound to `?`, `?1`, ... in order
    Positional(Vec<Value>),
    /// Bound to `:name`, `@name` or `$name`; the sigil is optional in the key
    Named(Vec<(String, Value)>),
}

impl Default for Params {
    fn default() -> Self {
        Self::Positional(Vec::new())
    }
}

impl Params {
    /// No parameters
    pub fn none() -> Self {
        Self::default()
    }

    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::Positional(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Positional(values) => values.is_empty(),
            Self::Named(pairs) => pairs.is_empty(),
        }
    }

    /// Bind these values onto a freshly prepared statement
    pub(crate) fn bind(&self, stmt: &mut Statement<'_>) -> Result<()> {
        let expected = stmt.parameter_count();

        match self {
            Self::Positional(values) => {
                if values.len() != expected {
                    return Err(Error::Parameter(format!(
                        "statement expects {} positional values, got {}",
                        expected,
                        values.len()
                    )));
                }
                for (i, value) in values.iter().enumerate() {
                    stmt.raw_bind_parameter(i + 1, value)
                        .map_err(|e| Error::sqlite("bind positional parameter", e))?;
                }
            }
            Self::Named(pairs) => {
                let mut bound = vec![false; expected];
                for (name, value) in pairs {
                    // Keys the statement does not reference are ignored
                    if let Some(index) = resolve_named(stmt, name)? {
                        stmt.raw_bind_parameter(index, value)
                            .map_err(|e| Error::sqlite("bind named parameter", e))?;
                        bound[index - 1] = true;
                    }
                }
                if let Some(missing) = bound.iter().position(|b| !b) {
                    let name = stmt
                        .parameter_name(missing + 1)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("?{}", missing + 1));
                    return Err(Error::Parameter(format!(
                        "no value supplied for parameter {}",
                        name
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Find the one-based index of a named parameter, trying each sigil when the
/// key was given without one
fn resolve_named(stmt: &Statement<'_>, name: &str) -> Result<Option<usize>> {
    if name.starts_with(NAMED_SIGILS) {
        return stmt
            .parameter_index(name)
            .map_err(|e| Error::sqlite("resolve named parameter", e));
    }

    for sigil in NAMED_SIGILS {
        let candidate = format!("{}{}", sigil, name);
        if let Some(index) = stmt
            .parameter_index(&candidate)
            .map_err(|e| Error::sqlite("resolve named parameter", e))?
        {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Self::Positional(values)
    }
}

/// One result row, keeping column order
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn from_sqlite(columns: &[String], row: &rusqlite::Row<'_>) -> Result<Self> {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            let value = row
                .get_ref(i)
                .map_err(|e| Error::sqlite("read column", e))?;
            values.push(Value::from(value));
        }
        Ok(Self {
            columns: columns.to_vec(),
            values,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of a column by name (case-insensitive, like SQLite itself)
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .map(|i| &self.values[i])
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Integer(v) => Some(*v),
            Value::Real(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        match self.get(column)? {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        match self.get(column)? {
            Value::Text(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self, column: &str) -> bool {
        matches!(self.get(column), Some(Value::Null))
    }

    /// Render as a JSON object; blobs become arrays of bytes
    pub fn to_json(&self) -> JsonValue {
        let mut map = Map::with_capacity(self.columns.len());
        for (column, value) in self.columns.iter().zip(&self.values) {
            let v = match value {
                Value::Null => JsonValue::Null,
                Value::Integer(i) => JsonValue::from(*i),
                Value::Real(f) => JsonValue::from(*f),
                Value::Text(s) => JsonValue::from(s.as_str()),
                Value::Blob(b) => JsonValue::from(b.clone()),
            };
            map.insert(column.clone(), v);
        }
        JsonValue::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, text TEXT)")
            .unwrap();
        conn
    }

    fn run(conn: &Connection, sql: &str, params: &Params) -> Result<usize> {
        let mut stmt = conn.prepare(sql).unwrap();
        params.bind(&mut stmt)?;
        stmt.raw_execute()
            .map_err(|e| Error::sqlite("execute", e))
    }

    #[test]
    fn test_positional_binding() {
        let conn = setup();
        let params = Params::positional([Value::Integer(1), Value::Text("one".into())]);
        assert_eq!(run(&conn, "INSERT INTO t VALUES (?, ?)", &params).unwrap(), 1);

        let text: String = conn
            .query_row("SELECT text FROM t WHERE id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(text, "one");
    }

    #[test]
    fn test_positional_count_mismatch() {
        let conn = setup();
        let params = Params::positional([Value::Integer(1)]);
        let err = run(&conn, "INSERT INTO t VALUES (?, ?)", &params).unwrap_err();
        assert!(matches!(err, Error::Parameter(_)));
    }

    #[test]
    fn test_named_binding_accepts_any_sigil() {
        let conn = setup();
        for (i, sql) in [
            "INSERT INTO t VALUES (:id, :text)",
            "INSERT INTO t VALUES (@id, @text)",
            "INSERT INTO t VALUES ($id, $text)",
        ]
        .iter()
        .enumerate()
        {
            let params = Params::named([
                ("id", Value::Integer(i as i64 + 1)),
                ("text", Value::Text(format!("row{}", i))),
                ("unused", Value::Null),
            ]);
            run(&conn, sql, &params).unwrap();
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_named_binding_with_explicit_sigil() {
        let conn = setup();
        let params = Params::named([(":id", Value::Integer(7)), (":text", Value::Null)]);
        run(&conn, "INSERT INTO t VALUES (:id, :text)", &params).unwrap();
    }

    #[test]
    fn test_named_binding_missing_value() {
        let conn = setup();
        let params = Params::named([("id", Value::Integer(1))]);
        let err = run(&conn, "INSERT INTO t VALUES (:id, :text)", &params).unwrap_err();
        match err {
            Error::Parameter(msg) => assert!(msg.contains(":text")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_row_accessors() {
        let row = Row {
            columns: vec!["cnt".into(), "name".into(), "gone".into()],
            values: vec![Value::Integer(3), Value::Text("x".into()), Value::Null],
        };
        assert_eq!(row.get_i64("CNT"), Some(3));
        assert_eq!(row.get_f64("cnt"), Some(3.0));
        assert_eq!(row.get_str("name"), Some("x"));
        assert!(row.is_null("gone"));
        assert!(!row.is_null("missing"));
        assert_eq!(
            row.to_json(),
            serde_json::json!({"cnt": 3, "name": "x", "gone": null})
        );
    }
}
