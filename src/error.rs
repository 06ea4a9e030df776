use std::fmt::Display;

/// Custom Result type for grader operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the grader
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed configuration or test definition
    Parse(String),
    /// Internal error (I/O, unexpected state)
    Internal(String),
    /// Routine body never balanced, or no CREATE/BEGIN to anchor it
    MalformedRoutine(String),
    /// Statement rejected by the database
    Database(String),
    /// Reference or setup statement rejected by the database
    Reference(String),
    /// Rollback did not restore the grading table
    Isolation(String),
}

impl Error {
    /// Whether the whole grading run must stop rather than move on to the
    /// next problem.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Reference(_) | Error::Isolation(_) | Error::Internal(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Error::Database(value.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Parse(value.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Internal(value.to_string())
    }
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Parse(err) => write!(f, "parse error {}", err),
            Error::Internal(err) => write!(f, "internal error {}", err),
            Error::MalformedRoutine(err) => write!(f, "malformed routine {}", err),
            Error::Database(err) => write!(f, "database error {}", err),
            Error::Reference(err) => write!(f, "reference query failed {}", err),
            Error::Isolation(err) => write!(f, "isolation violated {}", err),
        }
    }
}
