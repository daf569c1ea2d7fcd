use crate::error::{ChaosError, Result};
use crate::lorenz::{InitialState, LorenzParameters};
use crate::mapping::{map_indices, ChaoticMapping};
use crate::solvers::SolverSettings;
use crate::trajectory::{solve_with, IntegrationSpec, Trajectory};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// One parameter set: horizon, starting point and coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LorenzRun {
    pub spec: IntegrationSpec,
    pub initial: InitialState,
    pub params: LorenzParameters,
}

impl LorenzRun {
    pub fn new(spec: IntegrationSpec, initial: InitialState, params: LorenzParameters) -> Self {
        Self {
            spec,
            initial,
            params,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.spec.validate()?;
        if !self.initial.is_finite() {
            return Err(ChaosError::invalid(format!(
                "Initial state must be finite, got {}.",
                self.initial
            )));
        }
        if !self.params.is_finite() {
            return Err(ChaosError::invalid(format!(
                "Lorenz parameters must be finite, got {}.",
                self.params
            )));
        }
        Ok(())
    }

    pub fn solve(&self, settings: &SolverSettings) -> Result<Trajectory> {
        solve_with(self.spec, self.initial, self.params, settings)
    }
}

/// Solves both runs and maps B onto A, with default solver settings.
pub fn compute_chaotic_mapping(a: &LorenzRun, b: &LorenzRun) -> Result<ChaoticMapping> {
    compute_chaotic_mapping_with(a, b, &SolverSettings::default())
}

/// Solves `a` and `b` in parallel, then maps every sample of B to its nearest
/// successor in A. Either a complete mapping or the first failure is returned.
pub fn compute_chaotic_mapping_with(
    a: &LorenzRun,
    b: &LorenzRun,
    settings: &SolverSettings,
) -> Result<ChaoticMapping> {
    a.validate()?;
    b.validate()?;
    settings.validate()?;

    let (trajectory_a, trajectory_b) = rayon::join(
        || solve_labelled("A", a, settings),
        || solve_labelled("B", b, settings),
    );
    let mapping = map_indices(&trajectory_a?, &trajectory_b?)?;

    info!(
        samples = mapping.len(),
        variations = mapping.variation_count(),
        "computed chaotic mapping"
    );
    Ok(mapping)
}

fn solve_labelled(label: &str, run: &LorenzRun, settings: &SolverSettings) -> Result<Trajectory> {
    run.solve(settings).map_err(|err| {
        error!(run = label, "trajectory {label} failed: {err}");
        err
    })
}

#[cfg(test)]
mod tests {
    use super::{compute_chaotic_mapping, compute_chaotic_mapping_with, LorenzRun};
    use crate::error::ChaosError;
    use crate::lorenz::{InitialState, LorenzParameters};
    use crate::solvers::SolverSettings;
    use crate::trajectory::IntegrationSpec;

    fn classic(t_max: f64, samples: usize, x0: f64) -> LorenzRun {
        LorenzRun::new(
            IntegrationSpec::new(t_max, samples).expect("valid spec"),
            InitialState::new(x0, 1.0, 1.0),
            LorenzParameters::CLASSIC,
        )
    }

    #[test]
    fn identical_runs_give_the_identity_mapping() {
        let run = classic(50.0, 500, 1.0);
        let mapping = compute_chaotic_mapping(&run, &run).expect("mapping computes");
        assert_eq!(mapping.len(), 500);
        assert!(mapping.iter().all(|pair| pair.is_self_mapping()));
    }

    #[test]
    fn perturbed_start_produces_substantial_variation() {
        let a = classic(50.0, 50, 1.0);
        let b = classic(50.0, 50, 0.999);
        let mapping = compute_chaotic_mapping(&a, &b).expect("mapping computes");
        assert_eq!(mapping.len(), 50);
        assert!(
            mapping.variation_ratio() > 0.25,
            "only {} of {} entries varied",
            mapping.variation_count(),
            mapping.len()
        );
    }

    #[test]
    fn longer_horizon_decorrelates_most_entries() {
        let a = classic(100.0, 1000, 1.0);
        let b = classic(100.0, 1000, 0.999);
        let mapping = compute_chaotic_mapping(&a, &b).expect("mapping computes");
        assert!(mapping.variation_ratio() > 0.5);
        assert!(mapping.distinct_targets() > 100);
    }

    #[test]
    fn unequal_lengths_follow_b() {
        let a = classic(20.0, 50, 1.0);
        let b = classic(20.0, 9, 2.0);
        let mapping = compute_chaotic_mapping(&a, &b).expect("mapping computes");
        assert_eq!(mapping.len(), 9);
    }

    #[test]
    fn repeated_calls_agree() {
        let a = classic(30.0, 300, 1.0);
        let b = classic(30.0, 300, 2.0);
        let first = compute_chaotic_mapping(&a, &b).expect("mapping computes");
        let second = compute_chaotic_mapping(&a, &b).expect("mapping computes");
        assert_eq!(first, second);
    }

    #[test]
    fn invalid_run_fails_before_solving() {
        let good = classic(10.0, 10, 1.0);
        let mut bad = good;
        bad.spec.t_max = -3.0;
        assert!(matches!(
            compute_chaotic_mapping(&good, &bad),
            Err(ChaosError::InvalidInput(_))
        ));
        bad = good;
        bad.spec.sample_count = 0;
        assert!(matches!(
            compute_chaotic_mapping(&bad, &good),
            Err(ChaosError::InvalidInput(_))
        ));
    }

    #[test]
    fn divergence_is_returned_whole() {
        let a = classic(50.0, 10, 1.0);
        let b = classic(50.0, 10, 0.999);
        let settings = SolverSettings {
            max_steps: 10,
            ..SolverSettings::default()
        };
        let err = compute_chaotic_mapping_with(&a, &b, &settings).expect_err("step budget too small");
        assert!(matches!(err, ChaosError::SolverDivergence { .. }));
    }

    #[test]
    fn run_deserializes_from_nested_json() {
        let json = r#"{
            "spec": {"tMax": 50.0, "sampleCount": 50},
            "initial": [0.999, 1.0, 1.0],
            "params": {"sigma": 10.0, "rho": 28.0, "beta": 2.6666666666666665}
        }"#;
        let run: LorenzRun = serde_json::from_str(json).expect("deserialize");
        assert_eq!(run, classic(50.0, 50, 0.999));
    }
}
