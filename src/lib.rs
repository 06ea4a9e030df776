//! sqlgrader - the core of a SQL assignment autograder
//!
//! This crate provides:
//! - Statement segmentation of free-form student SQL, with `DELIMITER`
//!   handling and comment stripping
//! - Extraction of stored routine and CREATE TABLE definitions
//! - A comparison engine that runs student and reference statements under
//!   savepoints and diffs the resulting tables

pub mod config;
pub mod error;
pub mod grade;
pub mod sql;
