use std::sync::Arc;

use once_cell::sync::OnceCell;
use rolap_common::{CellValue, OlapError, OlapErrorKind, OlapResult};

use super::axis::Axis;
use super::cell_store::{CellInfo, CellInfoContainer, CellStore, Position};
use super::cells::CellEvaluator;
use super::modulos::Modulos;
use super::phase::run_phased;
use super::query::CellProperties;
use super::stats::{ExecutionStats, Step};
use crate::evaluator::{EvalContext, Evaluator, RootEvaluator};

/// One cell as seen by the caller, restricted to the requested properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    ordinal: u64,
    value: CellValue,
    formatted_value: Option<String>,
    format_string: Option<Arc<str>>,
}

impl Cell {
    fn from_info(info: &CellInfo, props: CellProperties) -> Self {
        Self {
            ordinal: info.ordinal(),
            value: if props.contains(CellProperties::VALUE) {
                info.value().clone()
            } else {
                CellValue::Null
            },
            formatted_value: props
                .contains(CellProperties::FORMATTED_VALUE)
                .then(|| info.formatted_value()),
            format_string: if props.contains(CellProperties::FORMAT_STRING) {
                info.format_string().cloned()
            } else {
                None
            },
        }
    }

    fn empty(ordinal: u64) -> Self {
        Self {
            ordinal,
            value: CellValue::Null,
            formatted_value: None,
            format_string: None,
        }
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    pub fn value(&self) -> &CellValue {
        &self.value
    }

    pub fn formatted_value(&self) -> Option<&str> {
        self.formatted_value.as_deref()
    }

    pub fn format_string(&self) -> Option<&str> {
        self.format_string.as_deref()
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn is_error(&self) -> bool {
        self.value.is_error()
    }
}

/// Evaluation state kept alive so cells can be computed on first access.
pub(crate) struct DeferredCells {
    root: RootEvaluator,
    context: EvalContext,
    phase_limit: usize,
    evaluator: CellEvaluator,
}

impl DeferredCells {
    pub(crate) fn new(
        root: RootEvaluator,
        context: EvalContext,
        phase_limit: usize,
        evaluator: CellEvaluator,
    ) -> Self {
        Self {
            root,
            context,
            phase_limit,
            evaluator,
        }
    }
}

/// Finished query result: axes, slicer axis and cells.
pub struct QueryResult {
    axes: Vec<Axis>,
    slicer_axis: Axis,
    cells: CellStore<CellInfo>,
    modulos: OnceCell<Option<Modulos>>,
    properties: CellProperties,
    stats: ExecutionStats,
    deferred: Option<DeferredCells>,
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("axes", &self.axes.iter().map(Axis::len).collect::<Vec<_>>())
            .field("cells", &self.cells.len())
            .field("deferred", &self.deferred.is_some())
            .finish_non_exhaustive()
    }
}

impl QueryResult {
    pub(crate) fn new(
        axes: Vec<Axis>,
        slicer_axis: Axis,
        cells: CellStore<CellInfo>,
        properties: CellProperties,
        stats: ExecutionStats,
        deferred: Option<DeferredCells>,
    ) -> Self {
        Self {
            axes,
            slicer_axis,
            cells,
            modulos: OnceCell::new(),
            properties,
            stats,
            deferred,
        }
    }

    pub fn axes(&self) -> &[Axis] {
        &self.axes
    }

    pub fn slicer_axis(&self) -> &Axis {
        &self.slicer_axis
    }

    pub fn stats(&self) -> &ExecutionStats {
        &self.stats
    }

    pub fn cell_properties(&self) -> CellProperties {
        self.properties
    }

    /// Cells materialized so far.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn is_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    fn modulos(&self) -> OlapResult<&Modulos> {
        self.modulos
            .get_or_init(|| {
                let lengths: Vec<usize> = self.axes.iter().map(Axis::len).collect();
                Modulos::new(&lengths)
            })
            .as_ref()
            .ok_or_else(|| OlapError::new(OlapErrorKind::ResultLimit).with_message("cell count overflows u64"))
    }

    /// Total number of addressable cells.
    pub fn total_cell_count(&self) -> OlapResult<u64> {
        Ok(self.modulos()?.cell_count())
    }

    pub fn cell_ordinal(&self, pos: &[usize]) -> OlapResult<u64> {
        self.check_pos(pos)?;
        Ok(self.modulos()?.cell_ordinal(pos))
    }

    pub fn cell_pos(&self, ordinal: u64) -> OlapResult<Position> {
        let modulos = self.modulos()?;
        if ordinal >= modulos.cell_count() {
            return Err(OlapError::new(OlapErrorKind::Range)
                .with_message(format!("cell ordinal {ordinal} out of range")));
        }
        Ok(modulos.cell_pos(ordinal))
    }

    fn check_pos(&self, pos: &[usize]) -> OlapResult<()> {
        if pos.len() != self.axes.len() {
            return Err(OlapError::new(OlapErrorKind::Range).with_message(format!(
                "expected {} coordinates, got {}",
                self.axes.len(),
                pos.len()
            )));
        }
        for (axis, (&p, a)) in pos.iter().zip(&self.axes).enumerate() {
            if p >= a.len() {
                return Err(OlapError::new(OlapErrorKind::Range)
                    .with_message(format!("coordinate {p} out of range on axis {axis}"))
                    .with_coordinates(pos));
            }
        }
        Ok(())
    }

    /// The cell at `pos` if it is already materialized.
    pub fn try_cell(&self, pos: &[usize]) -> OlapResult<Option<Cell>> {
        self.check_pos(pos)?;
        Ok(self
            .cells
            .lookup(pos)
            .map(|info| Cell::from_info(info, self.properties)))
    }

    /// The cell at `pos`, evaluating it first if cells are deferred.
    pub fn cell(&mut self, pos: &[usize]) -> OlapResult<Cell> {
        self.check_pos(pos)?;
        if let Some(info) = self.cells.lookup(pos) {
            return Ok(Cell::from_info(info, self.properties));
        }
        let ordinal = self.modulos()?.cell_ordinal(pos);
        let Some(deferred) = self.deferred.as_mut() else {
            return Ok(Cell::empty(ordinal));
        };

        let DeferredCells {
            root,
            context,
            phase_limit,
            evaluator,
        } = deferred;
        let axes = &self.axes;
        let built = run_phased(root, &mut self.stats, *phase_limit, Step::DeferredCell, |root| {
            let mut ev = Evaluator::new(root, context.fork());
            for (axis, &i) in axes.iter().zip(pos) {
                ev.set_tuple(&axis.positions()[i]);
            }
            evaluator.evaluate(&mut ev, pos, ordinal)
        })?;
        self.stats.cells_computed += 1;
        let info = built.freeze();
        let cell = Cell::from_info(&info, self.properties);
        *self.cells.create(pos) = info;
        Ok(cell)
    }

    /// Every cell in ordinal order, evaluating deferred ones.
    pub fn cells(&mut self) -> OlapResult<Vec<Cell>> {
        let count = self.total_cell_count()?;
        let mut out = Vec::with_capacity(count.min(1 << 16) as usize);
        for ordinal in 0..count {
            let pos = self.cell_pos(ordinal)?;
            out.push(self.cell(&pos)?);
        }
        Ok(out)
    }
}
