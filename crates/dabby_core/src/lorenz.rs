use crate::traits::{DynamicalSystem, Scalar};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coefficients of the Lorenz system.
///
/// The classic chaotic regime is σ = 10, ρ = 28, β = 8/3, which is also the default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LorenzParameters {
    pub sigma: f64,
    pub rho: f64,
    pub beta: f64,
}

impl LorenzParameters {
    pub const CLASSIC: Self = Self::new(10.0, 28.0, 8.0 / 3.0);

    pub const fn new(sigma: f64, rho: f64, beta: f64) -> Self {
        Self { sigma, rho, beta }
    }

    pub fn is_finite(&self) -> bool {
        self.sigma.is_finite() && self.rho.is_finite() && self.beta.is_finite()
    }
}

impl Default for LorenzParameters {
    fn default() -> Self {
        Self::CLASSIC
    }
}

impl fmt::Display for LorenzParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sigma = {}, rho = {}, beta = {}",
            self.sigma, self.rho, self.beta
        )
    }
}

/// State vector at t = 0. Serialized as `[x0, y0, z0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct InitialState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl InitialState {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for InitialState {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<InitialState> for [f64; 3] {
    fn from(state: InitialState) -> Self {
        state.to_array()
    }
}

impl fmt::Display for InitialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// The Lorenz vector field:
///
/// ẋ = σ(y − x)
/// ẏ = ρx − y − xz
/// ż = xy − βz
#[derive(Debug, Clone, Copy)]
pub struct LorenzSystem {
    pub params: LorenzParameters,
}

impl LorenzSystem {
    pub fn new(params: LorenzParameters) -> Self {
        Self { params }
    }
}

impl<T: Scalar> DynamicalSystem<T> for LorenzSystem {
    fn dimension(&self) -> usize {
        3
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let sigma = T::from_f64(self.params.sigma).unwrap_or_else(T::nan);
        let rho = T::from_f64(self.params.rho).unwrap_or_else(T::nan);
        let beta = T::from_f64(self.params.beta).unwrap_or_else(T::nan);
        let (x, y, z) = (x[0], x[1], x[2]);

        out[0] = sigma * (y - x);
        out[1] = rho * x - y - x * z;
        out[2] = x * y - beta * z;
    }
}
