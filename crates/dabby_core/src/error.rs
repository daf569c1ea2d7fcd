use crate::lorenz::{InitialState, LorenzParameters};
use thiserror::Error;

pub type Result<T, E = ChaosError> = std::result::Result<T, E>;

/// Errors surfaced by the solver, the mapper and the pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChaosError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The integrator gave up. Carries the parameter set so callers can report it.
    #[error("solver diverged at t = {t} for {params} from {initial}: {source}")]
    SolverDivergence {
        params: LorenzParameters,
        initial: InitialState,
        t: f64,
        #[source]
        source: SolverFailure,
    },
}

impl ChaosError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ChaosError::InvalidInput(message.into())
    }
}

/// Why an adaptive integration stopped before reaching the end of its span.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverFailure {
    #[error("state became non-finite at t = {t}")]
    NonFinite { t: f64 },

    #[error("step size {h:e} fell below the minimum representable step at t = {t}")]
    StepSizeUnderflow { t: f64, h: f64 },

    #[error("exceeded {max_steps} steps at t = {t}")]
    MaxStepsExceeded { t: f64, max_steps: usize },
}

impl SolverFailure {
    pub fn time(&self) -> f64 {
        match *self {
            SolverFailure::NonFinite { t }
            | SolverFailure::StepSizeUnderflow { t, .. }
            | SolverFailure::MaxStepsExceeded { t, .. } => t,
        }
    }
}
