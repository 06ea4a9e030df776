//! SQL handling
//!
//! This module provides:
//! - `parser`: statement segmentation, delimiter and comment handling,
//!   routine extraction
//! - `types`: column values and rows
//! - `engine`: the database abstraction grading runs against

pub mod engine;
pub mod parser;
pub mod types;
