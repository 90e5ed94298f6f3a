use std::fmt;

use crate::CellValue;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How a stored measure combines fact rows, and how already-aggregated
/// values of that measure roll up further.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Aggregator {
    Sum,
    Count,
    Min,
    Max,
    Avg,
    DistinctCount,
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Min => "min",
            Self::Max => "max",
            Self::Avg => "avg",
            Self::DistinctCount => "distinct-count",
        })
    }
}

impl Aggregator {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "avg" => Some(Self::Avg),
            "distinct-count" | "distinct count" | "distinctcount" => Some(Self::DistinctCount),
            _ => None,
        }
    }

    /// Distinct counts cannot be rolled up from partial aggregates; the
    /// combined member set has to be sent to the loader in one request.
    pub fn is_distinct(self) -> bool {
        matches!(self, Self::DistinctCount)
    }

    /// Aggregate a stream of raw fact values.
    pub fn aggregate<'a>(self, values: impl IntoIterator<Item = &'a CellValue>) -> CellValue {
        match self {
            Self::Count => {
                let n = values.into_iter().filter(|v| !v.is_null()).count();
                CellValue::Int(n as i64)
            }
            Self::DistinctCount => {
                let mut seen: Vec<&CellValue> = Vec::new();
                for v in values {
                    if !v.is_null() && !seen.contains(&v) {
                        seen.push(v);
                    }
                }
                CellValue::Int(seen.len() as i64)
            }
            _ => self.rollup(values.into_iter().cloned()),
        }
    }

    /// Combine already-aggregated values (one per sub-aggregate).
    ///
    /// Counts roll up by summation. Distinct counts also sum here, which is
    /// only correct for disjoint inputs.
    pub fn rollup(self, values: impl IntoIterator<Item = CellValue>) -> CellValue {
        let mut nums = Vec::new();
        for v in values {
            match v {
                CellValue::Null => {}
                CellValue::Error(_) | CellValue::Pending => return v,
                other => match other.as_f64() {
                    Some(n) => nums.push(n),
                    None => return CellValue::Null,
                },
            }
        }
        if nums.is_empty() {
            return CellValue::Null;
        }
        let out = match self {
            Self::Sum | Self::Count | Self::DistinctCount => nums.iter().sum(),
            Self::Min => nums.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => nums.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Avg => nums.iter().sum::<f64>() / nums.len() as f64,
        };
        match self {
            Self::Count | Self::DistinctCount => CellValue::Int(out as i64),
            _ => CellValue::Number(out),
        }
    }
}
