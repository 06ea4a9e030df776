//! Splits a SQL script into individually executable statements.
//!
//! There is no grammar here: a statement is recognized by its leading
//! keyword phrase and runs until its terminator, which is either the next
//! `;` outside quotes and comments or, for routine definitions, the closing
//! `END`.

use tracing::debug;

use super::{
    delimiter::preprocess,
    lexer::{find_phrase, match_phrase, skip_ignorable, ScanCursor},
};

/// How a statement ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// The next `;` outside quotes and comments
    Delimiter,
    /// The next occurrence of this keyword outside quotes and comments
    Keyword(&'static str),
}

/// A statement's leading keyword phrase and the terminator that closes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatementBoundary {
    pub keyword: &'static str,
    pub terminator: Terminator,
}

const fn stmt(keyword: &'static str) -> StatementBoundary {
    StatementBoundary {
        keyword,
        terminator: Terminator::Delimiter,
    }
}

const fn block(keyword: &'static str) -> StatementBoundary {
    StatementBoundary {
        keyword,
        terminator: Terminator::Keyword("END"),
    }
}

/// Boundary rules in priority order: the first rule whose keyword starts the
/// remaining text governs the statement. A rule whose statement can embed
/// another statement kind must precede that kind.
pub const STATEMENT_BOUNDARIES: &[StatementBoundary] = &[
    stmt("ALTER TABLE"),
    stmt("CALL"),
    stmt("COMMIT"),
    block("CREATE FUNCTION"),
    block("CREATE OR REPLACE FUNCTION"),
    block("CREATE PROCEDURE"),
    block("CREATE OR REPLACE PROCEDURE"),
    block("CREATE TRIGGER"),
    block("CREATE OR REPLACE TRIGGER"),
    stmt("CREATE INDEX"),
    stmt("CREATE UNIQUE INDEX"),
    // CREATE TABLE ... AS SELECT
    stmt("CREATE TABLE"),
    stmt("CREATE TEMPORARY TABLE"),
    // Views are defined by a SELECT.
    stmt("CREATE VIEW"),
    stmt("CREATE OR REPLACE VIEW"),
    stmt("DELETE"),
    stmt("DROP FUNCTION"),
    stmt("DROP INDEX"),
    stmt("DROP PROCEDURE"),
    stmt("DROP TABLE"),
    stmt("DROP TRIGGER"),
    stmt("DROP VIEW"),
    stmt("DO"),
    stmt("HANDLER"),
    stmt("INSERT"),
    stmt("LOAD DATA"),
    stmt("RELEASE SAVEPOINT"),
    stmt("REPLACE"),
    stmt("ROLLBACK"),
    stmt("SAVEPOINT"),
    // A WITH clause heads a SELECT.
    stmt("WITH"),
    stmt("SELECT"),
    stmt("SET"),
    stmt("START TRANSACTION"),
    stmt("TRUNCATE"),
    stmt("UPDATE"),
];

/// Returns the rule governing a statement that starts at the beginning of `text`
pub fn boundary_for(text: &str) -> Option<&'static StatementBoundary> {
    STATEMENT_BOUNDARIES
        .iter()
        .find(|rule| match_phrase(text, rule.keyword).is_some())
}

/// Whether `pos` lies outside every quote and comment, scanning afresh from `from`
fn in_code(sql: &str, from: usize, pos: usize) -> bool {
    let mut cursor = ScanCursor::new(sql, from);
    cursor.advance_to(pos);
    cursor.in_code()
}

/// Skips whitespace, comments and stray `;` separators
fn statement_start(sql: &str, mut offset: usize) -> Option<usize> {
    loop {
        let start = offset + skip_ignorable(&sql[offset..])?;
        if sql[start..].starts_with(';') {
            offset = start + 1;
        } else {
            return Some(start);
        }
    }
}

/// Finds where the statement starting at `start` ends. Returns the end of the
/// statement text and the offset scanning resumes from.
fn find_terminator(sql: &str, start: usize, rule: &StatementBoundary) -> (usize, usize) {
    match rule.terminator {
        Terminator::Delimiter => {
            let mut from = start;
            while let Some(found) = sql[from..].find(';') {
                let pos = from + found;
                if in_code(sql, start, pos) {
                    return (pos, pos + 1);
                }
                from = pos + 1;
            }
        }
        Terminator::Keyword(keyword) => {
            let mut from = start + rule.keyword.len();
            while let Some(pos) = find_phrase(sql, keyword, from) {
                let end = pos + match_phrase(&sql[pos..], keyword).unwrap_or(keyword.len());
                let closes = keyword != "END" || {
                    // END IF, END LOOP and friends are not the statement's end
                    let after = sql[end..].trim_start();
                    after.is_empty() || after.starts_with(';')
                };
                if closes && in_code(sql, start, pos) {
                    return (end, end);
                }
                from = pos + 1;
            }
        }
    }
    (sql.len(), sql.len())
}

/// Splits `sql` into statements in source order.
///
/// `sql` must already use `;` as its only delimiter (see `preprocess`).
/// Each statement is a slice of the input that starts at its leading keyword
/// and stops before the terminating `;` (a closing `END` is kept). Leading
/// comments are skipped, and text that no rule recognizes ends the scan.
pub fn segment(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut offset = 0;

    while let Some(start) = statement_start(sql, offset) {
        let Some(rule) = boundary_for(&sql[start..]) else {
            debug!(leftover = &sql[start..], "dropping unrecognized trailing text");
            break;
        };

        let (end, resume) = find_terminator(sql, start, rule);
        let statement = sql[start..end].trim_end();
        debug!(keyword = rule.keyword, statement, "segmented statement");
        statements.push(statement);
        offset = resume;
    }
    statements
}

/// Resolves `DELIMITER` directives, then segments the result
pub fn split_script(sql: &str) -> Vec<String> {
    segment(&preprocess(sql))
        .into_iter()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{boundary_for, segment, split_script, Terminator};

    #[test]
    fn test_single_statement() {
        assert_eq!(segment("INSERT INTO t VALUES (1);"), vec!["INSERT INTO t VALUES (1)"]);
        assert_eq!(segment("  SELECT 1  "), vec!["SELECT 1"]);
        assert_eq!(segment("select 1 ;\n\n"), vec!["select 1"]);
    }

    #[test]
    fn test_semicolon_in_literal() {
        assert_eq!(
            segment("INSERT INTO t VALUES ('a;b');"),
            vec!["INSERT INTO t VALUES ('a;b')"]
        );
        assert_eq!(
            segment("INSERT INTO t VALUES (\"x\\\";\", 'it''s;');SELECT 2;"),
            vec!["INSERT INTO t VALUES (\"x\\\";\", 'it''s;')", "SELECT 2"]
        );
    }

    #[test]
    fn test_semicolon_in_comments() {
        let sql = "DELETE FROM t -- ; not yet\nWHERE id = 1 /* ; */;\nSELECT 1; # ;\n";
        assert_eq!(
            segment(sql),
            vec!["DELETE FROM t -- ; not yet\nWHERE id = 1 /* ; */", "SELECT 1"]
        );
    }

    #[test]
    fn test_leading_comments_and_separators() {
        let sql = "-- header\n/* block */ ;; SELECT 1;;; # note\nSELECT 2";
        assert_eq!(segment(sql), vec!["SELECT 1", "SELECT 2"]);
    }

    #[test]
    fn test_trailing_noise_dropped() {
        assert_eq!(segment("SELECT 1; this is not sql"), vec!["SELECT 1"]);
        assert!(segment("").is_empty());
        assert!(segment("/* only a comment").is_empty());
    }

    #[test]
    fn test_prefix_rules_win() {
        let sql = "CREATE TABLE t2 AS SELECT * FROM t; CREATE VIEW v AS SELECT 1;";
        assert_eq!(
            segment(sql),
            vec!["CREATE TABLE t2 AS SELECT * FROM t", "CREATE VIEW v AS SELECT 1"]
        );
        assert_eq!(boundary_for("with x as (select 1) select * from x").unwrap().keyword, "WITH");
        assert_eq!(boundary_for("DROP TABLE t").unwrap().keyword, "DROP TABLE");
        assert_eq!(boundary_for("create  or  replace view v").unwrap().keyword, "CREATE OR REPLACE VIEW");
        assert!(boundary_for("EXPLAIN SELECT 1").is_none());
    }

    #[test]
    fn test_routine_ends_at_outer_end() {
        let sql = "CREATE PROCEDURE p(x INT)\n\
                   BEGIN\n\
                   IF x > 0 THEN\n\
                   SELECT 'end;';\n\
                   END IF;\n\
                   WHILE x > 0 DO SET x = x - 1; END WHILE;\n\
                   END;\n\
                   CALL p(3);";
        let statements = segment(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE PROCEDURE p(x INT)"));
        assert!(statements[0].ends_with("END WHILE;\nEND"));
        assert_eq!(statements[1], "CALL p(3)");
        assert_eq!(
            boundary_for(statements[0]).unwrap().terminator,
            Terminator::Keyword("END")
        );
    }

    #[test]
    fn test_routine_without_end_runs_to_eof() {
        let sql = "CREATE FUNCTION f() RETURNS INT BEGIN RETURN 1;";
        assert_eq!(segment(sql), vec![sql]);
    }

    #[test]
    fn test_split_script_with_delimiter() {
        let sql = "DELIMITER //\n\
                   CREATE FUNCTION f() RETURNS INT\n\
                   BEGIN\n\
                   RETURN 1;\n\
                   END //\n\
                   DELIMITER ;\n\
                   SELECT f();\n";
        let statements = split_script(sql);
        assert_eq!(
            statements,
            vec![
                "CREATE FUNCTION f() RETURNS INT\nBEGIN\nRETURN 1;\nEND".to_string(),
                "SELECT f()".to_string(),
            ]
        );
        assert!(statements.iter().all(|s| !s.contains("//")));
    }

    proptest! {
        #[test]
        fn prop_literal_semicolons_never_split(body in "[a-z0-9 ;]{0,24}") {
            let sql = format!("INSERT INTO t VALUES ('{}');", body);
            let statements = segment(&sql);
            prop_assert_eq!(statements.len(), 1);
            prop_assert_eq!(statements[0], &sql[..sql.len() - 1]);
        }

        #[test]
        fn prop_statement_count_preserved(
            ids in proptest::collection::vec(0u32..1000, 1..8),
            sep in "[ \n]{0,3}",
        ) {
            let sql = ids
                .iter()
                .map(|id| format!("DELETE FROM t WHERE id = {};", id))
                .collect::<Vec<_>>()
                .join(&sep);
            let statements = segment(&sql);
            prop_assert_eq!(statements.len(), ids.len());
            for (statement, id) in statements.iter().zip(&ids) {
                let expected = format!("DELETE FROM t WHERE id = {}", id);
                prop_assert_eq!(*statement, expected.as_str());
            }
        }
    }
}
