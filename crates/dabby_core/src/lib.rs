pub mod error;
pub mod lorenz;
pub mod mapping;
pub mod pipeline;
pub mod solvers;
pub mod trajectory;
/// The `dabby_core` crate is the engine behind chaotic score variants.
/// It integrates a Lorenz system twice and derives, for every sample of the second
/// trajectory, the index of the nearest-greater-or-equal sample of the first.
///
/// Key components:
/// - **Traits**: `Scalar` (numeric type abstraction), `DynamicalSystem` (vector fields).
/// - **Solvers**: Adaptive Dormand-Prince 5(4) with dense output.
/// - **Trajectory**: Evenly resampled first state variable of one integration.
/// - **Mapping**: Sort + upper-bound search producing a `ChaoticMapping`.
/// - **Pipeline**: `compute_chaotic_mapping`, solving both runs in parallel.
pub mod traits;

pub use error::{ChaosError, Result, SolverFailure};
pub use lorenz::{InitialState, LorenzParameters, LorenzSystem};
pub use mapping::{map_indices, ChaoticMapping, IndexPair, IndexedValue};
pub use pipeline::{compute_chaotic_mapping, compute_chaotic_mapping_with, LorenzRun};
pub use solvers::SolverSettings;
pub use trajectory::{solve, solve_with, IntegrationSpec, Trajectory};
