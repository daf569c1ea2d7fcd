use crate::error::{ChaosError, SolverFailure};
use crate::traits::DynamicalSystem;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tolerances and limits for the adaptive integrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub rtol: f64,
    pub atol: f64,
    pub max_steps: usize,
    /// Initial step size. Chosen automatically when `None`.
    pub first_step: Option<f64>,
    pub max_step: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            rtol: 1e-6,
            atol: 1e-9,
            max_steps: 10_000_000,
            first_step: None,
            max_step: f64::INFINITY,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<(), ChaosError> {
        if !(self.rtol > 0.0) {
            return Err(ChaosError::invalid("rtol must be positive."));
        }
        if !(self.atol > 0.0) {
            return Err(ChaosError::invalid("atol must be positive."));
        }
        if self.max_steps == 0 {
            return Err(ChaosError::invalid("max_steps must be greater than zero."));
        }
        if !(self.max_step > 0.0) {
            return Err(ChaosError::invalid("max_step must be positive."));
        }
        if let Some(h) = self.first_step {
            if !(h > 0.0 && h.is_finite()) {
                return Err(ChaosError::invalid("first_step must be positive and finite."));
            }
        }
        Ok(())
    }
}

/// Counters reported after an integration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntegrationStats {
    pub accepted: usize,
    pub rejected: usize,
    pub evaluations: usize,
}

const STAGES: usize = 7;

// Dormand-Prince 5(4) tableau.
const C: [f64; STAGES] = [0.0, 1.0 / 5.0, 3.0 / 10.0, 4.0 / 5.0, 8.0 / 9.0, 1.0, 1.0];

const A: [[f64; 6]; 6] = [
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [1.0 / 5.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [3.0 / 40.0, 9.0 / 40.0, 0.0, 0.0, 0.0, 0.0],
    [44.0 / 45.0, -56.0 / 15.0, 32.0 / 9.0, 0.0, 0.0, 0.0],
    [
        19372.0 / 6561.0,
        -25360.0 / 2187.0,
        64448.0 / 6561.0,
        -212.0 / 729.0,
        0.0,
        0.0,
    ],
    [
        9017.0 / 3168.0,
        -355.0 / 33.0,
        46732.0 / 5247.0,
        49.0 / 176.0,
        -5103.0 / 18656.0,
        0.0,
    ],
];

const B: [f64; 6] = [
    35.0 / 384.0,
    0.0,
    500.0 / 1113.0,
    125.0 / 192.0,
    -2187.0 / 6784.0,
    11.0 / 84.0,
];

// Difference between the 5th and embedded 4th order weights.
const E: [f64; STAGES] = [
    -71.0 / 57600.0,
    0.0,
    71.0 / 16695.0,
    -71.0 / 1920.0,
    17253.0 / 339200.0,
    -22.0 / 525.0,
    1.0 / 40.0,
];

// Continuous extension: y(t + θh) = y + h·K·P·[θ, θ², θ³, θ⁴]ᵀ.
const P: [[f64; 4]; STAGES] = [
    [
        1.0,
        -8048581381.0 / 2820520608.0,
        8663915743.0 / 2820520608.0,
        -12715105075.0 / 11282082432.0,
    ],
    [0.0, 0.0, 0.0, 0.0],
    [
        0.0,
        131558114200.0 / 32700410799.0,
        -68118460800.0 / 10900136933.0,
        87487479700.0 / 32700410799.0,
    ],
    [
        0.0,
        -1754552775.0 / 470086768.0,
        14199869525.0 / 1410260304.0,
        -10690763975.0 / 1880347072.0,
    ],
    [
        0.0,
        127303824393.0 / 49829197408.0,
        -318862633887.0 / 49829197408.0,
        701980252875.0 / 199316789632.0,
    ],
    [
        0.0,
        -282668133.0 / 205662961.0,
        2019193451.0 / 616988883.0,
        -1453857185.0 / 822651844.0,
    ],
    [
        0.0,
        40617522.0 / 29380423.0,
        -110615467.0 / 29380423.0,
        69997945.0 / 29380423.0,
    ],
];

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;
// Order of the embedded error estimator is 4.
const ERROR_EXPONENT: f64 = -1.0 / 5.0;

/// Dormand-Prince 5(4) adaptive solver with dense output.
///
/// Works in `f64` only: tolerances below about 1e-7 are meaningless in `f32`.
/// Any `DynamicalSystem<f64>` can be integrated, not just the Lorenz system.
pub struct Dopri5 {
    dim: usize,
    k: [Vec<f64>; STAGES],
    y_new: Vec<f64>,
    tmp: Vec<f64>,
    stats: IntegrationStats,
}

impl Dopri5 {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            k: std::array::from_fn(|_| vec![0.0; dim]),
            y_new: vec![0.0; dim],
            tmp: vec![0.0; dim],
            stats: IntegrationStats::default(),
        }
    }

    pub fn stats(&self) -> IntegrationStats {
        self.stats
    }

    fn eval(&mut self, system: &impl DynamicalSystem<f64>, t: f64, x: &[f64], out_stage: usize) {
        system.apply(t, x, &mut self.k[out_stage]);
        self.stats.evaluations += 1;
    }

    /// Integrates from t = 0 and returns the full state at every sample time.
    ///
    /// `sample_times` must be ascending and lie in `[0, t_end]`. A sample at t = 0
    /// is `y0` itself, and a sample that lands on the end of an accepted step is that
    /// step's state, so interpolation error never touches the endpoints.
    pub fn integrate_sampled(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        y0: &[f64],
        t_end: f64,
        sample_times: &[f64],
        settings: &SolverSettings,
    ) -> Result<Vec<Vec<f64>>, SolverFailure> {
        let dim = self.dim;
        self.stats = IntegrationStats::default();

        let mut samples = Vec::with_capacity(sample_times.len());
        let mut cursor = 0usize;
        let mut t = 0.0;
        let mut y = y0.to_vec();

        while cursor < sample_times.len() && sample_times[cursor] <= t {
            samples.push(y.clone());
            cursor += 1;
        }

        if !y.iter().all(|v| v.is_finite()) {
            return Err(SolverFailure::NonFinite { t });
        }

        // k[0] holds f(t, y) at the start of every step (FSAL).
        self.eval(system, t, &y, 0);
        let mut h = match settings.first_step {
            Some(h) => h,
            None => self.initial_step(system, t, &y, t_end, settings),
        };

        let mut steps = 0usize;
        while t < t_end {
            if steps >= settings.max_steps {
                return Err(SolverFailure::MaxStepsExceeded {
                    t,
                    max_steps: settings.max_steps,
                });
            }
            steps += 1;

            let min_step = 10.0 * f64::EPSILON * t.abs().max(f64::MIN_POSITIVE);
            h = h.min(settings.max_step).max(min_step);

            let mut step_rejected = false;
            let (t_new, h_taken) = loop {
                if h < min_step {
                    return Err(SolverFailure::StepSizeUnderflow { t, h });
                }

                let mut t_new = t + h;
                if t_new >= t_end {
                    t_new = t_end;
                }
                let h_step = t_new - t;

                let error_norm = self.attempt(system, t, &y, h_step, settings);

                if error_norm < 1.0 {
                    let factor = if error_norm == 0.0 {
                        MAX_FACTOR
                    } else {
                        (SAFETY * error_norm.powf(ERROR_EXPONENT)).min(MAX_FACTOR)
                    };
                    let factor = if step_rejected { factor.min(1.0) } else { factor };
                    h = h_step * factor;
                    break (t_new, h_step);
                }

                self.stats.rejected += 1;
                step_rejected = true;
                h = if error_norm.is_finite() {
                    h_step * (SAFETY * error_norm.powf(ERROR_EXPONENT)).max(MIN_FACTOR)
                } else {
                    h_step * MIN_FACTOR
                };
            };

            if !self.y_new.iter().all(|v| v.is_finite()) {
                return Err(SolverFailure::NonFinite { t: t_new });
            }
            self.stats.accepted += 1;

            if cursor < sample_times.len() && sample_times[cursor] <= t_new {
                let q = self.dense_coefficients();
                while cursor < sample_times.len() && sample_times[cursor] <= t_new {
                    let ts = sample_times[cursor];
                    if ts == t_new {
                        samples.push(self.y_new.clone());
                    } else {
                        samples.push(interpolate(&q, &y, h_taken, (ts - t) / h_taken));
                    }
                    cursor += 1;
                }
            }

            t = t_new;
            y.copy_from_slice(&self.y_new);
            let (first, rest) = self.k.split_at_mut(1);
            first[0].copy_from_slice(&rest[STAGES - 2]);
        }

        debug!(
            dim,
            accepted = self.stats.accepted,
            rejected = self.stats.rejected,
            evaluations = self.stats.evaluations,
            "integration finished"
        );

        Ok(samples)
    }

    /// Computes all stages for a step of size `h` from `(t, y)`, leaving the candidate
    /// state in `y_new` and f(t + h, y_new) in the last stage. Returns the scaled RMS
    /// error norm of the embedded estimate.
    fn attempt(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: f64,
        y: &[f64],
        h: f64,
        settings: &SolverSettings,
    ) -> f64 {
        let dim = self.dim;

        for s in 1..STAGES - 1 {
            for i in 0..dim {
                let mut acc = 0.0;
                for j in 0..s {
                    acc += A[s][j] * self.k[j][i];
                }
                self.tmp[i] = y[i] + h * acc;
            }
            let stage_input = std::mem::take(&mut self.tmp);
            self.eval(system, t + C[s] * h, &stage_input, s);
            self.tmp = stage_input;
        }

        for i in 0..dim {
            let mut acc = 0.0;
            for (j, b) in B.iter().enumerate() {
                acc += b * self.k[j][i];
            }
            self.y_new[i] = y[i] + h * acc;
        }

        let y_new = std::mem::take(&mut self.y_new);
        self.eval(system, t + h, &y_new, STAGES - 1);
        self.y_new = y_new;

        let mut sum = 0.0;
        for i in 0..dim {
            let mut err = 0.0;
            for (j, e) in E.iter().enumerate() {
                err += e * self.k[j][i];
            }
            let scale = settings.atol + y[i].abs().max(self.y_new[i].abs()) * settings.rtol;
            let scaled = h * err / scale;
            sum += scaled * scaled;
        }
        if dim == 0 {
            return 0.0;
        }
        (sum / dim as f64).sqrt()
    }

    /// `Q = K · P`, one row per state component.
    fn dense_coefficients(&self) -> DMatrix<f64> {
        let k = DMatrix::from_fn(self.dim, STAGES, |i, j| self.k[j][i]);
        let p = DMatrix::from_fn(STAGES, 4, |i, j| P[i][j]);
        k * p
    }

    /// Hairer's starting step heuristic, assuming `k[0]` already holds f(t, y).
    fn initial_step(
        &mut self,
        system: &impl DynamicalSystem<f64>,
        t: f64,
        y: &[f64],
        t_end: f64,
        settings: &SolverSettings,
    ) -> f64 {
        let dim = self.dim;
        let span = t_end - t;
        if dim == 0 {
            return span;
        }

        let scale: Vec<f64> = y
            .iter()
            .map(|v| settings.atol + v.abs() * settings.rtol)
            .collect();
        let d0 = rms_scaled(y, &scale);
        let d1 = rms_scaled(&self.k[0], &scale);

        let h0 = if d0 < 1e-5 || d1 < 1e-5 {
            1e-6
        } else {
            0.01 * d0 / d1
        };
        let h0 = h0.min(span);

        for i in 0..dim {
            self.tmp[i] = y[i] + h0 * self.k[0][i];
        }
        let nudged = std::mem::take(&mut self.tmp);
        self.eval(system, t + h0, &nudged, 1);
        self.tmp = nudged;

        let diff: Vec<f64> = (0..dim).map(|i| self.k[1][i] - self.k[0][i]).collect();
        let d2 = rms_scaled(&diff, &scale) / h0;

        let h1 = if d1 <= 1e-15 && d2 <= 1e-15 {
            (h0 * 1e-3).max(1e-6)
        } else {
            (0.01 / d1.max(d2)).powf(-ERROR_EXPONENT)
        };

        (100.0 * h0).min(h1).min(span).min(settings.max_step)
    }
}

fn rms_scaled(values: &[f64], scale: &[f64]) -> f64 {
    let sum: f64 = values
        .iter()
        .zip(scale)
        .map(|(v, s)| (v / s) * (v / s))
        .sum();
    (sum / values.len() as f64).sqrt()
}

fn interpolate(q: &DMatrix<f64>, y_old: &[f64], h: f64, theta: f64) -> Vec<f64> {
    let powers = DVector::from_vec(vec![
        theta,
        theta * theta,
        theta * theta * theta,
        theta * theta * theta * theta,
    ]);
    let delta = q * powers;
    y_old
        .iter()
        .zip(delta.iter())
        .map(|(y, d)| y + h * d)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Dopri5, SolverSettings, B, E, P};
    use crate::error::SolverFailure;
    use crate::traits::DynamicalSystem;

    struct Decay {
        rate: f64,
    }

    impl DynamicalSystem<f64> for Decay {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = -self.rate * x[0];
        }
    }

    /// Harmonic oscillator x'' = -x written as a first order system.
    struct Oscillator;

    impl DynamicalSystem<f64> for Oscillator {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[1];
            out[1] = -x[0];
        }
    }

    /// x' = x², which blows up at t = 1 from x(0) = 1.
    struct BlowUp;

    impl DynamicalSystem<f64> for BlowUp {
        fn dimension(&self) -> usize {
            1
        }

        fn apply(&self, _t: f64, x: &[f64], out: &mut [f64]) {
            out[0] = x[0] * x[0];
        }
    }

    #[test]
    fn tableau_weights_are_consistent() {
        let b_sum: f64 = B.iter().sum();
        assert!((b_sum - 1.0).abs() < 1e-14);
        let e_sum: f64 = E.iter().sum();
        assert!(e_sum.abs() < 1e-14);
        // At θ = 1 the continuous extension reproduces the 5th order weights.
        for (row, p) in P.iter().enumerate() {
            let weight: f64 = p.iter().sum();
            let expected = if row < B.len() { B[row] } else { 0.0 };
            assert!(
                (weight - expected).abs() < 1e-9,
                "row {row}: {weight} vs {expected}"
            );
        }
    }

    #[test]
    fn exponential_decay_matches_analytic_solution() {
        let times: Vec<f64> = (0..=20).map(|i| i as f64 * 0.25).collect();
        let mut solver = Dopri5::new(1);
        let samples = solver
            .integrate_sampled(&Decay { rate: 0.7 }, &[2.0], 5.0, &times, &SolverSettings::default())
            .expect("decay integrates");
        assert_eq!(samples.len(), times.len());
        for (t, state) in times.iter().zip(&samples) {
            let exact = 2.0 * (-0.7 * t).exp();
            assert!(
                (state[0] - exact).abs() < 1e-6,
                "t = {t}: {} vs {exact}",
                state[0]
            );
        }
        assert_eq!(samples[0], vec![2.0]);
    }

    #[test]
    fn dense_output_tracks_oscillator_between_steps() {
        let times: Vec<f64> = (0..=100).map(|i| i as f64 * 0.1).collect();
        let mut solver = Dopri5::new(2);
        let samples = solver
            .integrate_sampled(&Oscillator, &[1.0, 0.0], 10.0, &times, &SolverSettings::default())
            .expect("oscillator integrates");
        // Steps are far longer than the sample spacing, so most samples are interpolated.
        assert!(solver.stats().accepted < times.len());
        for (t, state) in times.iter().zip(&samples) {
            assert!((state[0] - t.cos()).abs() < 1e-5, "t = {t}");
            assert!((state[1] + t.sin()).abs() < 1e-5, "t = {t}");
        }
    }

    #[test]
    fn zero_vector_field_stays_exactly_at_rest() {
        struct Still;
        impl DynamicalSystem<f64> for Still {
            fn dimension(&self) -> usize {
                3
            }
            fn apply(&self, _t: f64, _x: &[f64], out: &mut [f64]) {
                out.fill(0.0);
            }
        }

        let times = [0.0, 0.5, 123.4, 1000.0];
        let mut solver = Dopri5::new(3);
        let samples = solver
            .integrate_sampled(&Still, &[0.0; 3], 1000.0, &times, &SolverSettings::default())
            .expect("still system integrates");
        for state in samples {
            assert_eq!(state, vec![0.0; 3]);
        }
    }

    #[test]
    fn blow_up_is_reported_not_masked() {
        let mut solver = Dopri5::new(1);
        let err = solver
            .integrate_sampled(&BlowUp, &[1.0], 2.0, &[0.0, 2.0], &SolverSettings::default())
            .expect_err("finite time blow up must fail");
        match err {
            SolverFailure::NonFinite { t } | SolverFailure::StepSizeUnderflow { t, .. } => {
                assert!(t <= 1.0 + 1e-6, "failure reported past the singularity: {t}");
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[test]
    fn step_budget_is_enforced() {
        let settings = SolverSettings {
            max_steps: 3,
            first_step: Some(1e-3),
            max_step: 1e-3,
            ..SolverSettings::default()
        };
        let mut solver = Dopri5::new(1);
        let err = solver
            .integrate_sampled(&Decay { rate: 1.0 }, &[1.0], 1.0, &[1.0], &settings)
            .expect_err("three steps cannot cover the span");
        assert!(matches!(err, SolverFailure::MaxStepsExceeded { max_steps: 3, .. }));
    }

    #[test]
    fn settings_validation_rejects_nonsense() {
        assert!(SolverSettings::default().validate().is_ok());
        let bad = [
            SolverSettings { rtol: 0.0, ..SolverSettings::default() },
            SolverSettings { atol: -1.0, ..SolverSettings::default() },
            SolverSettings { max_steps: 0, ..SolverSettings::default() },
            SolverSettings { max_step: 0.0, ..SolverSettings::default() },
            SolverSettings { first_step: Some(f64::NAN), ..SolverSettings::default() },
        ];
        for settings in bad {
            assert!(settings.validate().is_err(), "{settings:?} should be rejected");
        }
    }
}
