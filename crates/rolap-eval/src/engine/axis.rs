use crate::calc::Tuple;

/// A materialized result axis.
#[derive(Debug, Clone, Default)]
pub struct Axis {
    positions: Vec<Tuple>,
    ordered: bool,
}

impl Axis {
    pub fn new(positions: Vec<Tuple>, ordered: bool) -> Self {
        Self { positions, ordered }
    }

    /// The slicer axis of a query without a slicer: one empty position.
    pub fn empty_slicer() -> Self {
        Self::new(vec![Tuple::new()], false)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[Tuple] {
        &self.positions
    }

    pub fn position(&self, i: usize) -> Option<&Tuple> {
        self.positions.get(i)
    }

    /// Whether the axis expression imposed its own order.
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Unique names per position, for assertions and display.
    pub fn unique_names(&self) -> Vec<Vec<String>> {
        self.positions
            .iter()
            .map(|t| t.iter().map(|m| m.unique_name().to_string()).collect())
            .collect()
    }
}
