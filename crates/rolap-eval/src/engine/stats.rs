use std::fmt;
use std::time::Duration;

/// Orchestrator steps that run a phase loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    DetermineSlicer,
    ExecuteSlicer,
    DetermineAxes,
    ExecuteAxes,
    ComputeCells,
    DeferredCell,
}

impl Step {
    const COUNT: usize = 6;

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::DetermineSlicer => "determine slicer",
            Step::ExecuteSlicer => "execute slicer",
            Step::DetermineAxes => "determine axes",
            Step::ExecuteAxes => "execute axes",
            Step::ComputeCells => "compute cells",
            Step::DeferredCell => "deferred cell",
        })
    }
}

/// Counters collected over one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Passes run, across all steps.
    pub phases: u64,
    /// Aggregate batches loaded.
    pub loads: u64,
    redos: [u32; Step::COUNT],
    /// Reader counters of the last pass.
    pub hits: u64,
    pub misses: u64,
    pub pending: u64,
    pub cells_computed: u64,
    /// Times all axes were re-executed after dropping a no-`All` hierarchy.
    pub axis_reevaluations: u32,
    pub elapsed: Duration,
}

impl ExecutionStats {
    pub fn redos(&self, step: Step) -> u32 {
        self.redos[step.index()]
    }

    pub(crate) fn record_redo(&mut self, step: Step) {
        self.redos[step.index()] += 1;
    }

    pub fn total_redos(&self) -> u32 {
        self.redos.iter().sum()
    }
}
