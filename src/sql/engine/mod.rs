use std::{
    ops::{Deref, DerefMut},
    path::Path,
};

use tracing::error;

use crate::{
    error::Result,
    sql::{
        parser::{lexer::skip_ignorable, preprocess, split_script},
        types::Row,
    },
};

mod sqlite;

pub use sqlite::SqliteDatabase;

/// Rows returned by a statement; doubles as a table snapshot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Multiset difference: each row of `other` cancels at most one equal
    /// row of `self`.
    pub fn subtract(&self, other: &ResultSet) -> ResultSet {
        let mut remaining: Vec<&Row> = other.rows.iter().collect();
        let rows = self
            .rows
            .iter()
            .filter(|row| match remaining.iter().position(|r| *r == *row) {
                Some(i) => {
                    remaining.swap_remove(i);
                    false
                }
                None => true,
            })
            .cloned()
            .collect();
        ResultSet {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// Plain-text table of at most `max_rows` rows
    pub fn render(&self, max_rows: usize) -> String {
        let shown = &self.rows[..self.rows.len().min(max_rows)];
        let cells: Vec<Vec<String>> = shown
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                let width = cell.chars().count();
                match widths.get_mut(i) {
                    Some(w) => *w = (*w).max(width),
                    None => widths.push(width),
                }
            }
        }

        let line = |cells: &[String]| {
            cells
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{:<w$}", c, w = widths.get(i).copied().unwrap_or(0)))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };

        let mut out = vec![
            line(&self.columns),
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        ];
        out.extend(cells.iter().map(|row| line(row)));
        if self.rows.len() > shown.len() {
            out.push(format!("... ({} more rows)", self.rows.len() - shown.len()));
        }
        out.join("\n")
    }
}

/// Connection to the grading database.
///
/// Implementors provide `execute` and `in_transaction`; transaction control
/// is issued as plain SQL unless a backend needs its own spelling.
pub trait Database {
    /// Executes one statement. Queries return their rows, everything else an
    /// empty set.
    fn execute(&mut self, sql: &str) -> Result<ResultSet>;

    /// Whether a transaction is open, i.e. the connection left autocommit
    fn in_transaction(&self) -> bool;

    fn start_transaction(&mut self) -> Result<()> {
        self.execute("START TRANSACTION").map(|_| ())
    }

    fn savepoint(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("SAVEPOINT {}", name)).map(|_| ())
    }

    fn rollback_to(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("ROLLBACK TO SAVEPOINT {}", name)).map(|_| ())
    }

    fn release(&mut self, name: &str) -> Result<()> {
        self.execute(&format!("RELEASE SAVEPOINT {}", name)).map(|_| ())
    }

    fn commit(&mut self) -> Result<()> {
        self.execute("COMMIT").map(|_| ())
    }

    fn rollback(&mut self) -> Result<()> {
        self.execute("ROLLBACK").map(|_| ())
    }

    /// Executes every statement of a script in order and returns the result
    /// of the last one. Text the segmenter cannot place is sent as is so the
    /// database reports the problem.
    fn execute_script(&mut self, sql: &str) -> Result<ResultSet> {
        let statements = split_script(sql);
        if statements.is_empty() {
            if skip_ignorable(&preprocess(sql)).is_some() {
                return self.execute(sql);
            }
            return Ok(ResultSet::default());
        }

        let mut last = ResultSet::default();
        for statement in &statements {
            last = self.execute(statement)?;
        }
        Ok(last)
    }

    /// Sources a setup file into the database
    fn source_file(&mut self, path: &Path) -> Result<()> {
        let sql = std::fs::read_to_string(path)?;
        self.execute_script(&sql).map(|_| ())
    }

    /// Runs `sql` between optional setup and teardown scripts
    fn run_query(
        &mut self,
        sql: &str,
        setup: Option<&str>,
        teardown: Option<&str>,
    ) -> Result<ResultSet> {
        if let Some(setup) = setup {
            self.execute_script(setup)?;
        }
        let result = self.execute_script(sql)?;
        if let Some(teardown) = teardown {
            self.execute_script(teardown)?;
        }
        Ok(result)
    }
}

/// An open transaction that rolls back unless explicitly finished.
///
/// Derefs to the underlying database so statements, savepoints and
/// snapshots run inside it.
pub struct Transaction<'a, D: Database + ?Sized> {
    db: &'a mut D,
    open: bool,
}

impl<'a, D: Database + ?Sized> Transaction<'a, D> {
    pub fn begin(db: &'a mut D) -> Result<Self> {
        db.start_transaction()?;
        Ok(Self { db, open: true })
    }

    pub fn commit(mut self) -> Result<()> {
        self.db.commit()?;
        self.open = false;
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.open = false;
        self.db.rollback()
    }
}

impl<D: Database + ?Sized> Deref for Transaction<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.db
    }
}

impl<D: Database + ?Sized> DerefMut for Transaction<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.db
    }
}

impl<D: Database + ?Sized> Drop for Transaction<'_, D> {
    fn drop(&mut self) {
        if self.open && self.db.in_transaction() {
            if let Err(err) = self.db.rollback() {
                error!(error = %err, "implicit rollback failed");
            }
        }
    }
}
