use num_traits::{Float, FromPrimitive};
use std::fmt::Debug;

/// Numeric type a vector field can be evaluated in.
pub trait Scalar: Float + FromPrimitive + Debug + 'static {}

impl<T: Float + FromPrimitive + Debug + 'static> Scalar for T {}

/// A continuous-time system ẋ = f(t, x).
///
/// Vector fields are generic so they can be evaluated in any float type.
/// [`crate::solvers::Dopri5`] drives the `f64` instantiation; its error
/// control and dense output are tuned for double precision.
pub trait DynamicalSystem<T: Scalar> {
    /// Length of the state vector.
    fn dimension(&self) -> usize;

    /// Writes f(t, x) into `out`. Both slices have length `dimension()`.
    fn apply(&self, t: T, x: &[T], out: &mut [T]);

    /// Allocating form of [`DynamicalSystem::apply`].
    fn vector_field(&self, t: T, x: &[T]) -> Vec<T> {
        let mut out = vec![T::zero(); self.dimension()];
        self.apply(t, x, &mut out);
        out
    }

    /// True when every component of f(t, x) is exactly zero.
    fn is_stationary_at(&self, t: T, x: &[T]) -> bool {
        self.vector_field(t, x).iter().all(|v| v.is_zero())
    }
}
