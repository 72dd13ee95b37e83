/*!
Shared helpers for setting up chains.

Chains are embarrassingly parallel: every chain owns an independent copy of
its sampler, controller and RNG, so all that is shared between them at setup
time is the target density behind an `Arc`.
*/

use ndarray::Array1;
use num_traits::{Float, FromPrimitive};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Generates `n` random initial positions in `d`-dimensional space, drawn
/// from a standard normal distribution.
pub fn init<T>(n: usize, d: usize) -> Vec<Array1<T>>
where
    T: Float + FromPrimitive,
{
    let rng = SmallRng::seed_from_u64(rand::rng().random::<u64>());
    _init(n, d, rng)
}

/// Deterministic variant of [`init`] using the given seed.
pub fn init_with_seed<T>(n: usize, d: usize, seed: u64) -> Vec<Array1<T>>
where
    T: Float + FromPrimitive,
{
    _init(n, d, SmallRng::seed_from_u64(seed))
}

/// Deterministic variant of [`init`] with a fixed seed of 42.
pub fn init_det<T>(n: usize, d: usize) -> Vec<Array1<T>>
where
    T: Float + FromPrimitive,
{
    init_with_seed(n, d, 42)
}

fn _init<T>(n: usize, d: usize, mut rng: SmallRng) -> Vec<Array1<T>>
where
    T: Float + FromPrimitive,
{
    (0..n)
        .map(|_| {
            Array1::from_iter((0..d).map(|_| {
                let obs: f64 = rng.sample(StandardNormal);
                T::from_f64(obs).unwrap()
            }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_has_requested_shape() {
        let positions: Vec<Array1<f64>> = init(5, 3);
        assert_eq!(positions.len(), 5);
        assert!(positions.iter().all(|p| p.len() == 3));
    }

    #[test]
    fn init_det_is_reproducible() {
        let a: Vec<Array1<f32>> = init_det(4, 2);
        let b: Vec<Array1<f32>> = init_det(4, 2);
        assert_eq!(a, b);
    }
}
