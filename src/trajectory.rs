//! Coupling of the integer trajectory length to a fixed integration time.

use num_traits::{Float, FromPrimitive, ToPrimitive};

/// Smallest step size ever handed to the length computation or the
/// integrator, so the division below is never by zero.
pub(crate) const EPSILON_FLOOR: f64 = 1e-10;

/// Keeps the physical trajectory duration constant as the step size changes.
///
/// A trajectory of `n` leapfrog steps of size `epsilon` simulates the
/// Hamiltonian flow for a time of `n * epsilon`; whenever adaptation moves
/// `epsilon`, the step count has to move the other way to preserve the
/// configured total integration time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryLength<T> {
    target_time: T,
}

impl<T> TrajectoryLength<T>
where
    T: Float + FromPrimitive + ToPrimitive,
{
    /// Creates a coupler for the given total integration time.
    ///
    /// # Panics
    ///
    /// Panics if `target_time` is not a strictly positive finite number.
    pub fn new(target_time: T) -> Self {
        assert!(
            target_time.is_finite() && target_time > T::zero(),
            "target_time must be a positive finite number"
        );
        Self { target_time }
    }

    /// The fixed total integration time.
    pub fn target_time(&self) -> T {
        self.target_time
    }

    /// Number of leapfrog steps of size `epsilon` covering `target_time`,
    /// rounded to the nearest integer and clamped to at least one step.
    ///
    /// Monotonically non-increasing in `epsilon`.
    pub fn n_steps(&self, epsilon: T) -> usize {
        let floor = T::from_f64(EPSILON_FLOOR).unwrap();
        let steps = (self.target_time / epsilon.max(floor)).round();
        steps.to_usize().unwrap_or(usize::MAX).max(1)
    }
}
