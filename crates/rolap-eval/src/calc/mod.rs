//! Compiled expression interfaces.
//!
//! The MDX compiler lives outside this crate; it hands the engine trees of
//! [`Calc`] (scalar) and [`SetCalc`] (tuple list) objects. The building
//! blocks in [`scalar`] and [`set`] cover what the engine itself needs and
//! what programmatic callers usually build.

use std::fmt;

use rolap_common::{CellValue, OlapResult};
use smallvec::SmallVec;

use crate::evaluator::Evaluator;
use crate::member::{HierarchyId, MemberRef};

pub mod scalar;
pub mod set;

pub use scalar::{AggregateCalc, ArithOp, ArithmeticCalc, CachedCalc, ConstantCalc, MemberValueCalc, NamedMemberCalc};
pub use set::{
    ChildrenCalc, CrossJoinCalc, HierarchizeCalc, MembersCalc, OrderCalc, TupleListCalc,
    VisualTotalsCalc,
};

/// One position on an axis: a member per participating hierarchy.
pub type Tuple = SmallVec<[MemberRef; 4]>;

pub type TupleIter = Box<dyn Iterator<Item = Tuple> + Send>;

pub trait Calc: Send + Sync + fmt::Debug {
    fn evaluate(&self, ev: &mut Evaluator<'_>) -> OlapResult<CellValue>;

    /// Whether the result can change when `hierarchy`'s current member
    /// changes. Used to key cached values.
    fn depends_on(&self, _hierarchy: HierarchyId) -> bool {
        true
    }

    /// The hierarchy this expression effectively selects on, if it is a
    /// plain member reference.
    fn primary_hierarchy(&self) -> Option<HierarchyId> {
        None
    }
}

pub trait SetCalc: Send + Sync + fmt::Debug {
    fn evaluate_iterable(&self, ev: &mut Evaluator<'_>) -> OlapResult<TupleIter>;

    /// Explicitly ordered sets are never re-sorted into hierarchical order.
    fn is_ordered(&self) -> bool {
        false
    }
}

/// Collect a set calc eagerly.
pub fn evaluate_list(calc: &dyn SetCalc, ev: &mut Evaluator<'_>) -> OlapResult<Vec<Tuple>> {
    Ok(calc.evaluate_iterable(ev)?.collect())
}
