//! Engine error representation.
//!
//! - **`OlapErrorKind`** : the closed set of failure classes the engine knows
//! - **`ErrorContext`**  : optional cell location (axis coordinates)
//! - **`OlapError`**     : one struct that glues kind, message and context
//!
//! The kind drives the propagation policy: [`OlapErrorKind::is_fatal`] errors
//! escape per-cell containment and abort the execution, everything else is
//! stored as the value of the cell that raised it.

use std::{error::Error, fmt};

use crate::CellValue;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// All recognised engine error classes.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OlapErrorKind {
    /// Axis member product or materialized row count exceeded the configured limit.
    ResultLimit,
    /// A single pass issued more cell requests than the configured quantum.
    QuantumExceeded,
    /// Phase loop or calculated-member recursion did not converge.
    Cycle,
    Cancelled,
    Timeout,
    /// Generic expression evaluation failure.
    Eval,
    Type,
    Div,
    /// Unknown member, measure or hierarchy.
    Name,
    /// Cell coordinates outside the result grid.
    Range,
    /// Aggregate loading failed in the relational collaborator.
    Load,
    Internal,
}

impl fmt::Display for OlapErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ResultLimit => "#LIMIT!",
            Self::QuantumExceeded => "#QUANTUM!",
            Self::Cycle => "#CYCLE!",
            Self::Cancelled => "#CANCELLED!",
            Self::Timeout => "#TIMEOUT!",
            Self::Eval => "#EVAL!",
            Self::Type => "#TYPE!",
            Self::Div => "#DIV/0!",
            Self::Name => "#NAME?",
            Self::Range => "#RANGE!",
            Self::Load => "#LOAD!",
            Self::Internal => "#INTERNAL!",
        })
    }
}

impl OlapErrorKind {
    /// Fatal errors propagate to the top of the execution instead of being
    /// stored as a cell value.
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::ResultLimit
                | Self::QuantumExceeded
                | Self::Cycle
                | Self::Cancelled
                | Self::Timeout
                | Self::Internal
        )
    }

    /// Retryable errors are absorbed by the phase loop.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::QuantumExceeded)
    }
}

/// Location of the cell being evaluated when the error was raised.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ErrorContext {
    pub coordinates: Vec<usize>,
    pub member: Option<String>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OlapError {
    pub kind: OlapErrorKind,
    pub message: Option<String>,
    pub context: Option<ErrorContext>,
}

impl From<OlapErrorKind> for OlapError {
    fn from(kind: OlapErrorKind) -> Self {
        Self {
            kind,
            message: None,
            context: None,
        }
    }
}

impl OlapError {
    pub fn new(kind: OlapErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Attach the coordinates of the cell under evaluation.
    pub fn with_coordinates(mut self, coordinates: &[usize]) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::default);
        ctx.coordinates = coordinates.to_vec();
        self
    }

    /// Attach the unique name of the member whose expression failed.
    pub fn with_member<S: Into<String>>(mut self, member: S) -> Self {
        let ctx = self.context.get_or_insert_with(ErrorContext::default);
        ctx.member = Some(member.into());
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.kind.is_fatal()
    }

    pub fn result_limit(limit: u64, actual: u64) -> Self {
        Self::new(OlapErrorKind::ResultLimit).with_message(format!(
            "number of members to be read exceeded limit ({actual} > {limit})"
        ))
    }

    pub fn cancelled() -> Self {
        Self::new(OlapErrorKind::Cancelled).with_message("query cancelled")
    }

    pub fn timeout(elapsed_ms: u128) -> Self {
        Self::new(OlapErrorKind::Timeout)
            .with_message(format!("query timed out after {elapsed_ms} ms"))
    }
}

impl fmt::Display for OlapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;

        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }

        if let Some(ref ctx) = self.context {
            if let Some(ref member) = ctx.member {
                write!(f, " [member {member}]")?;
            }
            if !ctx.coordinates.is_empty() {
                write!(f, " (cell {:?})", ctx.coordinates)?;
            }
        }

        Ok(())
    }
}

impl Error for OlapError {}

impl From<OlapError> for CellValue {
    fn from(error: OlapError) -> Self {
        CellValue::Error(error)
    }
}

impl PartialEq<OlapErrorKind> for OlapError {
    fn eq(&self, other: &OlapErrorKind) -> bool {
        self.kind == *other
    }
}
