use std::sync::Arc;

use bitflags::bitflags;

use crate::calc::SetCalc;

bitflags! {
    /// Cell properties requested by the query.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct CellProperties: u8 {
        const VALUE           = 0b0001;
        const FORMATTED_VALUE = 0b0010;
        const FORMAT_STRING   = 0b0100;
        const CELL_ORDINAL    = 0b1000;
    }
}

impl Default for CellProperties {
    fn default() -> Self {
        Self::VALUE | Self::FORMATTED_VALUE | Self::CELL_ORDINAL
    }
}

impl CellProperties {
    /// Only ordinals requested: cells need no evaluation.
    pub fn ordinal_only(self) -> bool {
        self == Self::CELL_ORDINAL
    }
}

/// One compiled axis expression.
#[derive(Debug, Clone)]
pub struct QueryAxis {
    name: Arc<str>,
    set: Arc<dyn SetCalc>,
}

impl QueryAxis {
    pub fn new(name: impl Into<Arc<str>>, set: Arc<dyn SetCalc>) -> Self {
        Self {
            name: name.into(),
            set,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set(&self) -> &dyn SetCalc {
        self.set.as_ref()
    }
}

/// A compiled query: axis set expressions, an optional slicer and the
/// requested cell properties.
#[derive(Debug, Clone, Default)]
pub struct Query {
    axes: Vec<QueryAxis>,
    slicer: Option<QueryAxis>,
    cell_properties: CellProperties,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis(mut self, name: impl Into<Arc<str>>, set: Arc<dyn SetCalc>) -> Self {
        self.axes.push(QueryAxis::new(name, set));
        self
    }

    pub fn with_slicer(mut self, set: Arc<dyn SetCalc>) -> Self {
        self.slicer = Some(QueryAxis::new("SLICER", set));
        self
    }

    pub fn with_cell_properties(mut self, props: CellProperties) -> Self {
        self.cell_properties = props;
        self
    }

    pub fn axes(&self) -> &[QueryAxis] {
        &self.axes
    }

    pub fn slicer(&self) -> Option<&QueryAxis> {
        self.slicer.as_ref()
    }

    pub fn cell_properties(&self) -> CellProperties {
        self.cell_properties
    }
}
