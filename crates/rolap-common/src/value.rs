use std::{
    fmt::{self, Display},
    hash::{Hash, Hasher},
};

use crate::OlapError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The value of one cell or one scalar sub-expression.
///
/// `Pending` marks a value whose aggregate data has not been loaded yet; any
/// pass that produced one is discarded and rerun after the next load.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    Int(i64),
    Number(f64),
    Text(String),
    Boolean(bool),
    #[default]
    Null,
    Pending,

    Error(OlapError),
}

impl Hash for CellValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            CellValue::Int(i) => i.hash(state),
            CellValue::Number(n) => n.to_bits().hash(state),
            CellValue::Text(s) => s.hash(state),
            CellValue::Boolean(b) => b.hash(state),
            CellValue::Null => state.write_u8(0),
            CellValue::Pending => state.write_u8(1),
            CellValue::Error(e) => e.hash(state),
        }
    }
}

impl Eq for CellValue {}

impl Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Int(i) => write!(f, "{i}"),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Boolean(b) => write!(f, "{b}"),
            CellValue::Error(e) => write!(f, "{e}"),
            CellValue::Null => write!(f, ""),
            CellValue::Pending => write!(f, "Pending"),
        }
    }
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Number(n) => Some(*n),
            CellValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CellValue::Pending)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CellValue::Error(_))
    }

    /// Collapse integral floats back to `Int` so that sums of counts compare
    /// equal to loaded counts.
    pub fn normalize(self) -> Self {
        match self {
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
                CellValue::Int(n as i64)
            }
            other => other,
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(i: i64) -> Self {
        CellValue::Int(i)
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_turns_integral_numbers_into_ints() {
        assert_eq!(CellValue::Number(4.0).normalize(), CellValue::Int(4));
        assert_eq!(CellValue::Number(4.5).normalize(), CellValue::Number(4.5));
        assert_eq!(CellValue::Null.normalize(), CellValue::Null);
    }

    #[test]
    fn numeric_view() {
        assert_eq!(CellValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(CellValue::Text("x".into()).as_f64(), None);
        assert!(CellValue::Pending.is_pending());
    }
}
