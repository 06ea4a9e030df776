use std::fmt::Display;

/// A single column value as returned by the database
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    String(String),
    Blob(Vec<u8>),
}

impl Value {
    /// Equality where numeric values may differ by less than `tolerance`.
    /// Integers and floats compare by numeric value; everything else must
    /// match exactly.
    pub fn approx_eq(&self, other: &Value, tolerance: f64) -> bool {
        match (self, other) {
            (Value::Float(a), Value::Float(b)) => a == b || (a - b).abs() < tolerance,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                (*a as f64 - b).abs() < tolerance
            }
            (a, b) => a == b,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Blob(v) => {
                write!(f, "x'")?;
                for b in v {
                    write!(f, "{:02x}", b)?;
                }
                write!(f, "'")
            }
        }
    }
}

/// A row is a vector of values
pub type Row = Vec<Value>;

/// Row equality under `Value::approx_eq`
pub fn rows_approx_eq(a: &Row, b: &Row, tolerance: f64) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.approx_eq(y, tolerance))
}
