use crate::error::{ChaosError, Result};
use crate::lorenz::{InitialState, LorenzParameters, LorenzSystem};
use crate::solvers::{Dopri5, SolverSettings};
use crate::traits::DynamicalSystem;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Integration horizon and number of evenly spaced output samples in `[0, t_max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationSpec {
    pub t_max: f64,
    pub sample_count: usize,
}

impl IntegrationSpec {
    pub fn new(t_max: f64, sample_count: usize) -> Result<Self> {
        let spec = Self {
            t_max,
            sample_count,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.t_max > 0.0 && self.t_max.is_finite()) {
            return Err(ChaosError::invalid(format!(
                "tMax must be positive and finite, got {}.",
                self.t_max
            )));
        }
        if self.sample_count == 0 {
            return Err(ChaosError::invalid("sampleCount must be at least 1."));
        }
        Ok(())
    }

    /// Evenly spaced sample times covering both endpoints. A single sample sits at t = 0.
    pub fn sample_times(&self) -> Vec<f64> {
        match self.sample_count {
            0 => Vec::new(),
            1 => vec![0.0],
            n => {
                let last = n - 1;
                let step = self.t_max / last as f64;
                (0..n)
                    .map(|i| if i == last { self.t_max } else { i as f64 * step })
                    .collect()
            }
        }
    }
}

/// First state variable of one integration, sampled in temporal order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory {
    values: Vec<f64>,
}

impl Trajectory {
    pub fn from_values(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }
}

impl From<Vec<f64>> for Trajectory {
    fn from(values: Vec<f64>) -> Self {
        Self::from_values(values)
    }
}

/// Integrates the Lorenz system with default solver settings.
pub fn solve(
    spec: IntegrationSpec,
    initial: InitialState,
    params: LorenzParameters,
) -> Result<Trajectory> {
    solve_with(spec, initial, params, &SolverSettings::default())
}

/// Integrates the Lorenz system from `initial` over `[0, spec.t_max]` and returns x(t)
/// at `spec.sample_count` evenly spaced times.
pub fn solve_with(
    spec: IntegrationSpec,
    initial: InitialState,
    params: LorenzParameters,
    settings: &SolverSettings,
) -> Result<Trajectory> {
    spec.validate()?;
    settings.validate()?;
    if !initial.is_finite() {
        return Err(ChaosError::invalid(format!(
            "Initial state must be finite, got {initial}."
        )));
    }
    if !params.is_finite() {
        return Err(ChaosError::invalid(format!(
            "Lorenz parameters must be finite, got {params}."
        )));
    }

    let system = LorenzSystem::new(params);
    let start = initial.to_array();
    // The field is autonomous, so an equilibrium stays put for every t.
    if DynamicalSystem::<f64>::is_stationary_at(&system, 0.0, &start) {
        debug!("{initial} is an equilibrium for {params}, skipping integration");
        return Ok(Trajectory::from_values(vec![initial.x; spec.sample_count]));
    }

    let times = spec.sample_times();
    let mut solver = Dopri5::new(3);
    let states = solver
        .integrate_sampled(&system, &start, spec.t_max, &times, settings)
        .map_err(|source| ChaosError::SolverDivergence {
            params,
            initial,
            t: source.time(),
            source,
        })?;

    debug_assert_eq!(states.len(), spec.sample_count);

    let stats = solver.stats();
    debug!(
        t_max = spec.t_max,
        samples = spec.sample_count,
        accepted = stats.accepted,
        rejected = stats.rejected,
        "solved trajectory for {params} from {initial}"
    );

    Ok(Trajectory::from_values(
        states.into_iter().map(|state| state[0]).collect(),
    ))
}
