use anyhow::{Context, Result};
use dabby_core::{InitialState, IntegrationSpec, LorenzParameters, LorenzRun, SolverSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a variant needs besides the score itself.
///
/// Deserialized from flat JSON keys: `tMaxA`, `sampleCountA`, `initialA`, `rhoA`,
/// `sigmaA`, `betaA`, the `B` analogues, `numberOfPitches` and an optional
/// `solver` block. Missing keys fall back to [`VariantConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariantConfig {
    pub t_max_a: f64,
    pub sample_count_a: usize,
    pub initial_a: InitialState,
    pub rho_a: f64,
    pub sigma_a: f64,
    pub beta_a: f64,

    pub t_max_b: f64,
    pub sample_count_b: usize,
    pub initial_b: InitialState,
    pub rho_b: f64,
    pub sigma_b: f64,
    pub beta_b: f64,

    /// Pitch pool size; 0 uses every root of the part.
    pub number_of_pitches: usize,

    pub solver: SolverSettings,
}

impl Default for VariantConfig {
    fn default() -> Self {
        let classic = LorenzParameters::CLASSIC;
        Self {
            t_max_a: 5000.0,
            sample_count_a: 5000,
            initial_a: InitialState::new(1.0, 1.0, 1.0),
            rho_a: classic.rho,
            sigma_a: classic.sigma,
            beta_a: classic.beta,

            t_max_b: 5000.0,
            sample_count_b: 5000,
            initial_b: InitialState::new(0.9999, 1.0, 1.0),
            rho_b: classic.rho,
            sigma_b: classic.sigma,
            beta_b: classic.beta,

            number_of_pitches: 0,
            solver: SolverSettings::default(),
        }
    }
}

impl VariantConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn run_a(&self) -> LorenzRun {
        LorenzRun::new(
            IntegrationSpec {
                t_max: self.t_max_a,
                sample_count: self.sample_count_a,
            },
            self.initial_a,
            LorenzParameters::new(self.sigma_a, self.rho_a, self.beta_a),
        )
    }

    pub fn run_b(&self) -> LorenzRun {
        LorenzRun::new(
            IntegrationSpec {
                t_max: self.t_max_b,
                sample_count: self.sample_count_b,
            },
            self.initial_b,
            LorenzParameters::new(self.sigma_b, self.rho_b, self.beta_b),
        )
    }

    pub fn validate(&self) -> Result<()> {
        self.run_a().validate().context("Invalid A parameters")?;
        self.run_b().validate().context("Invalid B parameters")?;
        self.solver.validate().context("Invalid solver settings")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::VariantConfig;
    use dabby_core::{InitialState, LorenzParameters};

    #[test]
    fn defaults_are_the_reference_pair() {
        let config = VariantConfig::default();
        let a = config.run_a();
        let b = config.run_b();
        assert_eq!(a.params, LorenzParameters::CLASSIC);
        assert_eq!(b.params, LorenzParameters::CLASSIC);
        assert_eq!(a.initial, InitialState::new(1.0, 1.0, 1.0));
        assert_eq!(b.initial, InitialState::new(0.9999, 1.0, 1.0));
        assert_eq!(a.spec.sample_count, 5000);
        assert_eq!(config.number_of_pitches, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn flat_keys_map_onto_runs() {
        let json = r#"{
            "tMaxA": 50, "sampleCountA": 50, "initialA": [1.0, 1.0, 1.0],
            "rhoA": 28.0, "sigmaA": 10.0, "betaA": 2.0,
            "tMaxB": 100, "sampleCountB": 10000, "initialB": [0.999, 1.0, 1.0],
            "rhoB": 30.0, "sigmaB": 11.0, "betaB": 3.0,
            "numberOfPitches": 9
        }"#;
        let config: VariantConfig = serde_json::from_str(json).expect("parse");
        let a = config.run_a();
        let b = config.run_b();
        assert_eq!(a.spec.t_max, 50.0);
        assert_eq!(a.params, LorenzParameters::new(10.0, 28.0, 2.0));
        assert_eq!(b.spec.sample_count, 10000);
        assert_eq!(b.initial, InitialState::new(0.999, 1.0, 1.0));
        assert_eq!(b.params, LorenzParameters::new(11.0, 30.0, 3.0));
        assert_eq!(config.number_of_pitches, 9);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: VariantConfig =
            serde_json::from_str(r#"{"numberOfPitches": 12, "solver": {"rtol": 1e-8}}"#)
                .expect("parse");
        assert_eq!(config.number_of_pitches, 12);
        assert_eq!(config.t_max_a, 5000.0);
        assert_eq!(config.solver.rtol, 1e-8);
        assert_eq!(config.solver.atol, 1e-9);
    }

    #[test]
    fn invalid_runs_are_reported_by_side() {
        let config = VariantConfig {
            sample_count_b: 0,
            ..VariantConfig::default()
        };
        let err = config.validate().expect_err("zero samples");
        assert!(format!("{err:#}").contains("Invalid B parameters"), "{err:#}");
    }

    #[test]
    fn load_reads_json_files() {
        let path = std::env::temp_dir().join(format!("dabby_config_test_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"tMaxA": 12.5}"#).expect("write config");
        let config = VariantConfig::load(&path).expect("load");
        std::fs::remove_file(&path).ok();
        assert_eq!(config.t_max_a, 12.5);
    }
}
