//! Grader configuration, threaded into the comparison engine at construction.

use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// Tunables for a grading pass
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    /// Decimal places compared when checking floating-point columns
    pub precision: u32,
    /// Rows rendered per snapshot in diff text
    pub max_num_results: usize,
    /// Savepoints are named `<prefix>_<problem kind>`
    pub savepoint_prefix: String,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            precision: 2,
            max_num_results: 50,
            savepoint_prefix: "spt".to_string(),
        }
    }
}

impl GraderConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Largest absolute difference at which two floats still compare equal
    pub fn tolerance(&self) -> f64 {
        10f64.powi(-(self.precision as i32))
    }
}
