//! Hamiltonian Monte Carlo that samples uniformly from static-length
//! trajectories.
//!
//! One transition integrates a trajectory of a fixed number of leapfrog steps
//! and progressively draws the returned state from the visited states with
//! probability proportional to their Boltzmann weight `exp(H0 - H)`. The
//! realized acceptance statistic is the average Metropolis probability
//! `min(1, exp(H0 - H))` over the whole trajectory, which is what the step
//! size adaptation in [`crate::adapt`] consumes.

use crate::euclidean::EuclideanVector;
use crate::sample::Sample;
use crate::writer::{DiagnosticWriter, NullWriter};
use num_traits::{Float, FromPrimitive, One, Zero};
use rand::distr::Distribution as RandDistribution;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{StandardNormal, StandardUniform};
use std::sync::Arc;

/// A target density that can write its gradient in-place for a given position.
pub trait HamiltonianTarget<V: EuclideanVector> {
    /// Returns the log-density at `position` and writes the gradient into `grad`.
    fn logp_and_grad(&self, position: &V, grad: &mut V) -> V::Scalar;
}

/// One proposal per call from a trajectory of `n_steps` leapfrog steps of
/// size `epsilon`.
///
/// Both `epsilon` and `n_steps` are passed by value on every call; the
/// sampler holds no step size state of its own.
pub trait TrajectorySampler<V: EuclideanVector> {
    /// Wraps a raw position into the sample the transition loop starts from.
    fn init_sample(&mut self, position: V) -> Sample<V>;

    /// Produces the next sample starting from `init`.
    ///
    /// The returned sample's acceptance statistic lies in `[0, 1]`.
    fn transition(&mut self, init: &Sample<V>, epsilon: V::Scalar, n_steps: usize) -> Sample<V>;
}

/// Single-chain static uniform HMC.
///
/// The chain shares its target with sibling chains through an [`Arc`] but is
/// otherwise fully independent: RNG, buffers and diagnostics are per chain.
#[derive(Debug)]
pub struct StaticUniformChain<V, Target, W = NullWriter>
where
    V: EuclideanVector,
    Target: HamiltonianTarget<V>,
{
    target: Arc<Target>,
    rng: SmallRng,
    writer: W,
    _marker: std::marker::PhantomData<V>,
}

impl<V, Target> StaticUniformChain<V, Target, NullWriter>
where
    V: EuclideanVector,
    Target: HamiltonianTarget<V>,
{
    pub fn new(target: Arc<Target>) -> Self {
        Self::with_writer(target, NullWriter)
    }
}

impl<V, Target, W> StaticUniformChain<V, Target, W>
where
    V: EuclideanVector,
    Target: HamiltonianTarget<V>,
    W: DiagnosticWriter,
{
    pub fn with_writer(target: Arc<Target>, writer: W) -> Self {
        let mut thread_rng = rand::rng();
        Self {
            target,
            rng: SmallRng::from_rng(&mut thread_rng),
            writer,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub(crate) fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }
}

impl<V, Target, W> TrajectorySampler<V> for StaticUniformChain<V, Target, W>
where
    V: EuclideanVector,
    V::Scalar: Float + FromPrimitive,
    Target: HamiltonianTarget<V>,
    W: DiagnosticWriter,
    StandardNormal: RandDistribution<V::Scalar>,
    StandardUniform: RandDistribution<V::Scalar>,
{
    fn init_sample(&mut self, position: V) -> Sample<V> {
        let mut grad = position.zeros_like();
        let logp = self.target.logp_and_grad(&position, &mut grad);
        Sample::new(position, logp, V::Scalar::one())
    }

    fn transition(&mut self, init: &Sample<V>, epsilon: V::Scalar, n_steps: usize) -> Sample<V> {
        let half = V::Scalar::from_f64(0.5).unwrap();
        let one = V::Scalar::one();

        let mut position = init.position().clone();
        let mut grad = position.zeros_like();
        let mut logp = self.target.logp_and_grad(&position, &mut grad);

        let mut momentum = position.zeros_like();
        momentum.fill_standard_normal(&mut self.rng);
        let h0 = momentum.dot(&momentum) * half - logp;

        let mut chosen = position.clone();
        let mut chosen_logp = logp;

        // The initial state enters both sums with weight exp(H0 - H0) = 1.
        let mut sum_weight = one;
        let mut sum_metro = one;
        let mut divergences = 0usize;

        for _ in 0..n_steps {
            logp = leapfrog(
                self.target.as_ref(),
                &mut position,
                &mut momentum,
                &mut grad,
                epsilon,
            );
            let h = momentum.dot(&momentum) * half - logp;

            let weight = if h.is_finite() {
                (h0 - h).exp()
            } else {
                divergences += 1;
                V::Scalar::zero()
            };
            sum_weight = sum_weight + weight;
            sum_metro = sum_metro + weight.min(one);

            // Progressive uniform draw over the trajectory states.
            let u: V::Scalar = self.rng.sample(StandardUniform);
            if u < weight / sum_weight {
                chosen.assign(&position);
                chosen_logp = logp;
            }
        }

        if divergences > 0 {
            self.writer.error(&format!(
                "{divergences} divergent leapfrog step(s) in trajectory of {n_steps}"
            ));
        }

        let accept_stat = sum_metro / V::Scalar::from_usize(n_steps + 1).unwrap();
        Sample::new(chosen, chosen_logp, accept_stat)
    }
}

/// One leapfrog step: half-kick, drift, half-kick. Returns the log-density at
/// the new position and leaves the gradient buffer in sync with it.
pub(crate) fn leapfrog<V, Target>(
    target: &Target,
    position: &mut V,
    momentum: &mut V,
    grad: &mut V,
    epsilon: V::Scalar,
) -> V::Scalar
where
    V: EuclideanVector,
    V::Scalar: Float + FromPrimitive,
    Target: HamiltonianTarget<V>,
{
    let half = V::Scalar::from_f64(0.5).unwrap();
    momentum.add_scaled_assign(grad, epsilon * half);
    position.add_scaled_assign(momentum, epsilon);
    let logp = target.logp_and_grad(position, grad);
    momentum.add_scaled_assign(grad, epsilon * half);
    logp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::DiagGaussian;
    use ndarray::arr1;

    fn standard_normal_2d() -> Arc<DiagGaussian<f64>> {
        Arc::new(DiagGaussian::new(arr1(&[0.0, 0.0]), arr1(&[1.0, 1.0])))
    }

    #[test]
    fn accept_stat_is_a_probability() {
        let mut chain = StaticUniformChain::new(standard_normal_2d()).set_seed(1);
        let mut current = chain.init_sample(arr1(&[0.5, -0.25]));
        for _ in 0..200 {
            current = chain.transition(&current, 0.5, 8);
            let stat = current.accept_stat();
            assert!((0.0..=1.0).contains(&stat), "accept_stat = {stat}");
            assert!(current.logp().is_finite());
        }
    }

    #[test]
    fn tiny_stepsize_accepts_nearly_everything() {
        let mut chain = StaticUniformChain::new(standard_normal_2d()).set_seed(2);
        let mut current = chain.init_sample(arr1(&[0.1, 0.1]));
        let mut min_stat = 1.0_f64;
        for _ in 0..50 {
            current = chain.transition(&current, 1e-3, 4);
            min_stat = min_stat.min(current.accept_stat());
        }
        // The integrator is near-exact at this resolution.
        assert!(min_stat > 0.99, "min accept_stat = {min_stat}");
    }

    #[test]
    fn seeded_chains_are_reproducible() {
        let start = arr1(&[1.0, -1.0]);
        let mut a = StaticUniformChain::new(standard_normal_2d()).set_seed(7);
        let mut b = StaticUniformChain::new(standard_normal_2d()).set_seed(7);
        let init_a = a.init_sample(start.clone());
        let init_b = b.init_sample(start);
        let sample_a = a.transition(&init_a, 0.3, 5);
        let sample_b = b.transition(&init_b, 0.3, 5);
        assert_eq!(sample_a, sample_b);
    }

    #[test]
    fn divergent_trajectory_reports_zero_weight_states() {
        // A huge step size on a tight Gaussian overflows the Hamiltonian.
        let target = Arc::new(DiagGaussian::new(arr1(&[0.0]), arr1(&[1e-4])));
        let mut chain = StaticUniformChain::new(target).set_seed(3);
        let mut current = chain.init_sample(arr1(&[0.0]));
        for _ in 0..20 {
            current = chain.transition(&current, 50.0, 3);
            assert!(current.accept_stat().is_finite());
            assert!((0.0..=1.0).contains(&current.accept_stat()));
        }
    }
}
