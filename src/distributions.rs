//! Analytic-gradient target densities for tests and demos.

use crate::euclidean::EuclideanVector;
use crate::static_uniform::HamiltonianTarget;
use ndarray::{Array1, LinalgScalar};
use num_traits::Float;
use rand::distr::Distribution as RandDistribution;
use rand_distr::uniform::SampleUniform;
use rand_distr::StandardNormal;

/// A Gaussian with diagonal covariance, expressed through per-dimension
/// standard deviations.
#[derive(Debug, Clone, PartialEq)]
pub struct DiagGaussian<T> {
    pub mean: Array1<T>,
    pub std: Array1<T>,
}

impl<T: Float> DiagGaussian<T> {
    /// # Panics
    ///
    /// Panics if `mean` and `std` have different lengths or any standard
    /// deviation is not strictly positive.
    pub fn new(mean: Array1<T>, std: Array1<T>) -> Self {
        assert_eq!(mean.len(), std.len(), "mean and std must have equal length");
        assert!(
            std.iter().all(|s| *s > T::zero()),
            "standard deviations must be positive"
        );
        Self { mean, std }
    }
}

impl<T> HamiltonianTarget<Array1<T>> for DiagGaussian<T>
where
    T: Float + LinalgScalar + SampleUniform + Copy + std::fmt::Debug,
    StandardNormal: RandDistribution<T>,
{
    fn logp_and_grad(&self, position: &Array1<T>, grad: &mut Array1<T>) -> T {
        let half = T::from(0.5).unwrap();
        let mut logp = T::zero();
        for i in 0..position.len() {
            let z = (position[i] - self.mean[i]) / self.std[i];
            logp = logp - half * z * z;
            grad[i] = -z / self.std[i];
        }
        logp
    }
}

/// The 2D Rosenbrock density `exp(-((a - x)^2 + b (y - x^2)^2))`, a standard
/// banana-shaped stress test for gradient-based samplers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rosenbrock2D<T> {
    pub a: T,
    pub b: T,
}

impl<T> HamiltonianTarget<Array1<T>> for Rosenbrock2D<T>
where
    T: Float + LinalgScalar + SampleUniform + Copy + std::fmt::Debug,
    StandardNormal: RandDistribution<T>,
{
    fn logp_and_grad(&self, position: &Array1<T>, grad: &mut Array1<T>) -> T {
        let two = T::from(2.0).unwrap();
        let four = T::from(4.0).unwrap();
        let (x, y) = (position[0], position[1]);

        let gap = y - x * x;
        let logp = -((self.a - x) * (self.a - x) + self.b * gap * gap);
        grad[0] = two * (self.a - x) + four * self.b * x * gap;
        grad[1] = -two * self.b * gap;
        logp
    }
}
