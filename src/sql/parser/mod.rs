//! Statement-boundary parsing for student SQL.
//!
//! Nothing here builds a syntax tree. The parser only answers where
//! statements start and end:
//! - `delimiter`: resolves `DELIMITER` directives to `;`
//! - `comment`: strips comments while keeping line numbers
//! - `segment`: splits a script into statements
//! - `routine`: isolates stored routine and CREATE TABLE definitions

pub mod comment;
pub mod delimiter;
pub mod lexer;
pub mod routine;
pub mod segment;

pub use comment::remove_comments;
pub use delimiter::preprocess;
pub use routine::{extract_create_tables, extract_routine, RoutineKind};
pub use segment::{segment, split_script, StatementBoundary, Terminator, STATEMENT_BOUNDARIES};
