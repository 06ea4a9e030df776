//! Per-problem-type grading strategies.
//!
//! Every mutation problem shares the same savepoint skeleton in
//! [`Grader`](super::Grader); a strategy only decides which submissions are
//! run, how the resulting tables are compared, and what the diff shows.

use tracing::warn;

use super::QueryError;
use crate::sql::{
    engine::ResultSet,
    parser::{
        lexer::{find_phrase, ScanCursor},
        segment,
        segment::boundary_for,
        split_script,
    },
    types::{rows_approx_eq, Row},
};

/// Outcome of screening a submission before it reaches the database
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// Run the submission as written
    Accepted(String),
    /// Run this single statement cut out of the submission instead
    Salvaged(String),
    /// Never run anything; award no credit
    Rejected(QueryError),
}

/// A kind of mutation problem
pub trait ProblemType {
    /// Lowercase statement keyword, also used to name the savepoint
    fn name(&self) -> &'static str;

    fn validate(&self, sql: &str) -> Validation {
        if check_valid_query(sql, self.name()) {
            Validation::Accepted(sql.to_string())
        } else {
            warn!(kind = self.name(), "submission rejected");
            Validation::Rejected(QueryError::MaliciousQuery)
        }
    }

    /// Whether the table after the student's statement matches the table
    /// after the reference statement
    fn compare(&self, expected: &ResultSet, actual: &ResultSet, tolerance: f64) -> bool;

    /// Cuts both after-snapshots down to the rows worth showing in a diff
    fn reduce(
        &self,
        before: &ResultSet,
        expected: &ResultSet,
        actual: &ResultSet,
    ) -> (ResultSet, ResultSet) {
        (expected.subtract(before), actual.subtract(before))
    }
}

/// INSERT problems: the resulting tables must hold the same rows in any order
#[derive(Debug, Clone, Copy, Default)]
pub struct Insert;

impl ProblemType for Insert {
    fn name(&self) -> &'static str {
        "insert"
    }

    fn compare(&self, expected: &ResultSet, actual: &ResultSet, tolerance: f64) -> bool {
        multiset_eq(&expected.rows, &actual.rows, tolerance)
    }
}

/// DELETE problems: the surviving rows must match in order.
///
/// A submission with stray statements around the DELETE is not rejected
/// outright; the DELETE is cut out and graded with a note.
#[derive(Debug, Clone, Copy, Default)]
pub struct Delete;

impl ProblemType for Delete {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn validate(&self, sql: &str) -> Validation {
        if check_valid_query(sql, self.name()) {
            return Validation::Accepted(sql.to_string());
        }
        match find_valid_sql(sql, self.name()) {
            Some(salvaged) => {
                warn!(salvaged = %salvaged, "graded a DELETE cut out of a larger submission");
                Validation::Salvaged(salvaged)
            }
            None => {
                warn!(kind = self.name(), "submission rejected");
                Validation::Rejected(QueryError::BadQuery)
            }
        }
    }

    fn compare(&self, expected: &ResultSet, actual: &ResultSet, tolerance: f64) -> bool {
        ordered_eq(&expected.rows, &actual.rows, tolerance)
    }

    // Both snapshots share whatever neither statement deleted, so each side
    // shows only the rows the other side lacks.
    fn reduce(
        &self,
        _before: &ResultSet,
        expected: &ResultSet,
        actual: &ResultSet,
    ) -> (ResultSet, ResultSet) {
        (expected.subtract(actual), actual.subtract(expected))
    }
}

/// UPDATE problems: compared like inserts, the diff shows rows the update
/// produced that were not there before
#[derive(Debug, Clone, Copy, Default)]
pub struct Update;

impl ProblemType for Update {
    fn name(&self) -> &'static str {
        "update"
    }

    fn compare(&self, expected: &ResultSet, actual: &ResultSet, tolerance: f64) -> bool {
        multiset_eq(&expected.rows, &actual.rows, tolerance)
    }
}

/// Best-effort screen: the statement keyword appears somewhere and there is
/// at most one `;`. Not a security boundary.
pub fn check_valid_query(sql: &str, kind: &str) -> bool {
    sql.to_uppercase().contains(&kind.to_uppercase()) && sql.matches(';').count() <= 1
}

/// Cuts the first statement of kind `kind` out of `sql`, up to its
/// terminating `;`. Mentions of the keyword inside literals and comments are
/// skipped.
pub fn find_valid_sql(sql: &str, kind: &str) -> Option<String> {
    let mut from = 0;
    while let Some(start) = find_phrase(sql, kind, from) {
        let mut cursor = ScanCursor::new(sql, 0);
        cursor.advance_to(start);
        if cursor.in_code() && cursor.position() == start {
            return segment(&sql[start..]).into_iter().next().map(str::to_string);
        }
        from = start + 1;
    }
    None
}

/// Whether any statement of `sql` opens, ends or rewinds a transaction or
/// savepoint
pub fn controls_transaction(sql: &str) -> bool {
    split_script(sql).iter().any(|statement| {
        boundary_for(statement).is_some_and(|rule| {
            matches!(
                rule.keyword,
                "COMMIT" | "ROLLBACK" | "SAVEPOINT" | "RELEASE SAVEPOINT" | "START TRANSACTION"
            )
        })
    })
}

/// Same rows with the same multiplicities, in any order
pub fn multiset_eq(expected: &[Row], actual: &[Row], tolerance: f64) -> bool {
    if expected.len() != actual.len() {
        return false;
    }
    let mut unmatched: Vec<&Row> = actual.iter().collect();
    expected.iter().all(|row| {
        match unmatched.iter().position(|r| rows_approx_eq(row, r, tolerance)) {
            Some(i) => {
                unmatched.swap_remove(i);
                true
            }
            None => false,
        }
    })
}

/// Same rows in the same order
pub fn ordered_eq(expected: &[Row], actual: &[Row], tolerance: f64) -> bool {
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(actual)
            .all(|(e, a)| rows_approx_eq(e, a, tolerance))
}
