//! The comparison engine.
//!
//! A student's mutation statement and the reference statement both run
//! against the grading database. The student's effect is always undone
//! through a savepoint, the reference's effect is either committed or rolled
//! back per test, and the two resulting tables are compared.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    config::GraderConfig,
    error::{Error, Result},
    sql::engine::{Database, ResultSet, Transaction},
};

pub mod problem;
pub mod response;

pub use problem::{
    check_valid_query, controls_transaction, find_valid_sql, Delete, Insert, ProblemType, Update,
    Validation,
};
pub use response::Response;

/// Why a submission was not run as written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryError {
    /// Stray text around the statement; a single statement was cut out
    BadQuery,
    /// Not the expected statement kind, or more than one statement
    MaliciousQuery,
}

/// One test of a mutation problem, as written by the assignment author
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MutationTest {
    /// Reference statement
    pub query: String,
    /// Table whose contents decide the verdict
    pub table: String,
    /// Restricts the comparison to these columns
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    #[serde(default)]
    pub setup: Option<String>,
    #[serde(default)]
    pub teardown: Option<String>,
    /// Undo the reference statement too, instead of committing it
    #[serde(default)]
    pub rollback: bool,
    pub points: f64,
}

impl MutationTest {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    fn snapshot_sql(&self) -> String {
        let columns = match &self.columns {
            Some(columns) if !columns.is_empty() => columns.join(", "),
            _ => "*".to_string(),
        };
        format!("SELECT {} FROM {}", columns, self.table)
    }
}

/// Verdict for one test
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProblemResult {
    pub deducted: f64,
    pub success: bool,
    /// Rendered rows the reference produced and the student did not
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub notes: Vec<QueryError>,
}

/// Grades submissions against one database connection
pub struct Grader<D: Database> {
    db: D,
    config: GraderConfig,
}

impl<D: Database> Grader<D> {
    pub fn new(db: D, config: GraderConfig) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    pub fn database(&mut self) -> &mut D {
        &mut self.db
    }

    pub fn into_inner(self) -> D {
        self.db
    }

    /// Runs one mutation test.
    ///
    /// A rejected submission is scored without touching the database. A
    /// student statement that fails is reported as `Error::Database` once the
    /// database is back in autocommit; a failing reference statement is
    /// `Error::Reference`. Any failure to unwind the student's effect, or to
    /// finish the transaction afterwards, is `Error::Isolation`.
    pub fn grade_mutation_test<P: ProblemType + ?Sized>(
        &mut self,
        problem: &P,
        response: &Response,
        test: &MutationTest,
    ) -> Result<ProblemResult> {
        let table_sql = test.snapshot_sql();
        let setup = test.setup.as_deref();
        let teardown = test.teardown.as_deref();
        let before = self.db.execute(&table_sql).map_err(reference_error)?;

        let mut result = ProblemResult::default();
        let sql = match problem.validate(&response.sql) {
            Validation::Accepted(sql) => sql,
            Validation::Salvaged(sql) => {
                result.notes.push(QueryError::BadQuery);
                sql
            }
            Validation::Rejected(note) => {
                result.notes.push(note);
                result.deducted = test.points;
                info!(kind = problem.name(), table = %test.table, "rejected without running");
                return Ok(result);
            }
        };
        // Anything that ends or rewinds the transaction would escape the
        // savepoint and make the student's effect permanent.
        if controls_transaction(&sql) {
            warn!(kind = problem.name(), "submission controls the transaction");
            result.notes.push(QueryError::MaliciousQuery);
            result.deducted = test.points;
            return Ok(result);
        }

        let savepoint = format!("{}_{}", self.config.savepoint_prefix, problem.name());
        let mut txn = Transaction::begin(&mut self.db)?;
        txn.savepoint(&savepoint)?;
        let student = txn
            .run_query(&sql, setup, teardown)
            .and_then(|_| txn.execute(&table_sql));
        if let Err(err) = &student {
            warn!(error = %err, kind = problem.name(), "student statement failed");
        }
        if !txn.in_transaction() {
            error!(kind = problem.name(), "student statement ended the grading transaction");
            return Err(Error::Isolation(
                "transaction closed by the student statement".to_string(),
            ));
        }
        txn.rollback_to(&savepoint).map_err(isolation_error)?;
        check_isolation(&mut *txn, &table_sql, &before)?;

        let expected = txn
            .run_query(&test.query, setup, teardown)
            .and_then(|_| txn.execute(&table_sql))
            .map_err(reference_error)?;

        if test.rollback {
            txn.rollback().map_err(isolation_error)?;
            check_isolation(&mut self.db, &table_sql, &before)?;
        } else {
            txn.release(&savepoint).map_err(isolation_error)?;
            txn.commit().map_err(isolation_error)?;
        }
        let actual = student?;

        if problem.compare(&expected, &actual, self.config.tolerance()) {
            info!(kind = problem.name(), table = %test.table, "correct");
            result.success = true;
            return Ok(result);
        }

        info!(kind = problem.name(), table = %test.table, "incorrect");
        let (expected, actual) = problem.reduce(&before, &expected, &actual);
        result.deducted = test.points;
        result.expected = Some(expected.render(self.config.max_num_results));
        result.actual = Some(actual.render(self.config.max_num_results));
        Ok(result)
    }
}

/// A reference statement the database refuses means the test itself is broken
fn reference_error(err: Error) -> Error {
    match err {
        Error::Database(msg) => Error::Reference(msg),
        err => err,
    }
}

/// Transaction control failing after the student ran means the savepoint
/// can no longer be trusted
fn isolation_error(err: Error) -> Error {
    error!(error = %err, "lost control of the grading transaction");
    match err {
        Error::Database(msg) => Error::Isolation(msg),
        err => err,
    }
}

/// Checks a rollback restored the table to its row count before grading
fn check_isolation<D: Database + ?Sized>(
    db: &mut D,
    table_sql: &str,
    before: &ResultSet,
) -> Result<()> {
    let after = db
        .execute(table_sql)
        .map_err(|err| Error::Isolation(err.to_string()))?;
    if after.len() != before.len() {
        error!(
            before = before.len(),
            after = after.len(),
            "rollback did not restore the table"
        );
        return Err(Error::Isolation(format!(
            "{} rows before grading, {} after rollback",
            before.len(),
            after.len()
        )));
    }
    Ok(())
}
