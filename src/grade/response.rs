use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

/// One problem's answer from a submission file
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Response {
    /// Text of the student's `--` comment lines, marker stripped
    pub comments: String,
    pub sql: String,
}

impl Response {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            comments: String::new(),
            sql: sql.into(),
        }
    }

    /// Splits a submission into responses keyed by problem number.
    ///
    /// A line `-- [Problem N]` opens problem `N`. Blank lines are skipped,
    /// lines starting with `--` are comments and everything else is SQL.
    /// Text before the first marker belongs to no problem and is ignored.
    pub fn parse_submission(text: &str) -> BTreeMap<String, Response> {
        let mut responses: BTreeMap<String, Response> = BTreeMap::new();
        let mut current: Option<String> = None;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(number) = problem_marker(trimmed) {
                responses.entry(number.to_string()).or_default();
                current = Some(number.to_string());
                continue;
            }

            let Some(response) = current.as_ref().and_then(|n| responses.get_mut(n)) else {
                debug!(line, "ignoring text before the first problem marker");
                continue;
            };
            if let Some(comment) = line.strip_prefix("--") {
                response.comments.push_str(comment.trim_start());
                response.comments.push('\n');
            } else {
                response.sql.push_str(line);
                response.sql.push('\n');
            }
        }
        responses
    }
}

/// `-- [Problem 3]` yields `3`
fn problem_marker(line: &str) -> Option<&str> {
    let inner = line
        .strip_prefix("--")?
        .trim_start()
        .strip_prefix('[')?
        .strip_suffix(']')?
        .trim();
    let number = inner.strip_prefix("Problem")?.trim();
    (!number.is_empty()).then_some(number)
}
