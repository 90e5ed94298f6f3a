use std::time::Duration;

use rolap_common::{OlapError, OlapErrorKind};
use thiserror::Error;

/// Tunables for one query execution.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalConfig {
    /// Max product of axis member counts; `None` disables the check.
    pub result_limit: Option<u64>,
    /// Phase-loop bound per orchestrator step.
    pub max_eval_depth: usize,
    /// Doubles `max_eval_depth`.
    pub diagnostic: bool,
    /// Max new cell requests one pass may record before it is cut short.
    pub cell_batch_quantum: Option<usize>,
    /// Calculated-member recursion bound.
    pub max_calc_depth: usize,
    pub timeout: Option<Duration>,
    /// Skip cell computation; cells are evaluated on first access.
    pub deferred_cells: bool,
    /// Poll cancellation every N loop iterations.
    pub cancel_check_interval: u32,
    /// Locale used to resolve the default value formatter.
    pub locale: String,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            result_limit: None,
            max_eval_depth: 10,
            diagnostic: false,
            cell_batch_quantum: None,
            max_calc_depth: 64,
            timeout: None,
            deferred_cells: false,
            cancel_check_interval: 1,
            locale: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max_eval_depth must be at least 1")]
    ZeroEvalDepth,
    #[error("max_calc_depth must be at least 1")]
    ZeroCalcDepth,
    #[error("cancel_check_interval must be at least 1")]
    ZeroCancelInterval,
    #[error("result_limit of 0 admits no cells; use None to disable the limit")]
    ZeroResultLimit,
    #[error("cell_batch_quantum must be at least 1")]
    ZeroQuantum,
}

impl From<ConfigError> for OlapError {
    fn from(e: ConfigError) -> Self {
        OlapError::new(OlapErrorKind::Internal).with_message(e.to_string())
    }
}

impl EvalConfig {
    pub fn with_result_limit(mut self, limit: u64) -> Self {
        self.result_limit = Some(limit);
        self
    }

    pub fn with_max_eval_depth(mut self, depth: usize) -> Self {
        self.max_eval_depth = depth;
        self
    }

    pub fn with_diagnostic(mut self, on: bool) -> Self {
        self.diagnostic = on;
        self
    }

    pub fn with_cell_batch_quantum(mut self, quantum: usize) -> Self {
        self.cell_batch_quantum = Some(quantum);
        self
    }

    pub fn with_max_calc_depth(mut self, depth: usize) -> Self {
        self.max_calc_depth = depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_deferred_cells(mut self, on: bool) -> Self {
        self.deferred_cells = on;
        self
    }

    pub fn with_cancel_check_interval(mut self, every: u32) -> Self {
        self.cancel_check_interval = every;
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Effective phase-loop bound.
    pub fn phase_limit(&self) -> usize {
        if self.diagnostic {
            self.max_eval_depth * 2
        } else {
            self.max_eval_depth
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_eval_depth == 0 {
            return Err(ConfigError::ZeroEvalDepth);
        }
        if self.max_calc_depth == 0 {
            return Err(ConfigError::ZeroCalcDepth);
        }
        if self.cancel_check_interval == 0 {
            return Err(ConfigError::ZeroCancelInterval);
        }
        if self.result_limit == Some(0) {
            return Err(ConfigError::ZeroResultLimit);
        }
        if self.cell_batch_quantum == Some(0) {
            return Err(ConfigError::ZeroQuantum);
        }
        Ok(())
    }
}
