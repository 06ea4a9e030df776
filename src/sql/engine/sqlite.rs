use std::path::Path;

use rusqlite::{types::Value as SqliteValue, Connection};
use tracing::debug;

use super::{Database, ResultSet};
use crate::{
    error::Result,
    sql::types::{Row, Value},
};

/// A grading database backed by SQLite
pub struct SqliteDatabase {
    conn: Connection,
}

impl SqliteDatabase {
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }
}

impl From<SqliteValue> for Value {
    fn from(value: SqliteValue) -> Self {
        match value {
            SqliteValue::Null => Value::Null,
            SqliteValue::Integer(v) => Value::Integer(v),
            SqliteValue::Real(v) => Value::Float(v),
            SqliteValue::Text(v) => Value::String(v),
            SqliteValue::Blob(v) => Value::Blob(v),
        }
    }
}

impl Database for SqliteDatabase {
    fn execute(&mut self, sql: &str) -> Result<ResultSet> {
        debug!(sql, "executing statement");
        let mut stmt = self.conn.prepare(sql.trim())?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        if columns.is_empty() {
            stmt.execute([])?;
            return Ok(ResultSet {
                columns,
                rows: Vec::new(),
            });
        }

        let width = columns.len();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, SqliteValue>(i).map(Value::from))
                    .collect::<rusqlite::Result<Row>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ResultSet { columns, rows })
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    // SQLite spells it BEGIN.
    fn start_transaction(&mut self) -> Result<()> {
        self.execute("BEGIN").map(|_| ())
    }
}
