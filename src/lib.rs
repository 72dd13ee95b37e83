//! # static-hmc
//!
//! Adaptive **static-trajectory Hamiltonian Monte Carlo** for continuous
//! targets with analytic gradients.
//!
//! Each transition integrates Hamiltonian dynamics for a fixed number of
//! leapfrog steps and samples uniformly (Boltzmann-weighted) from the visited
//! trajectory states. During warmup a dual-averaging controller tunes the
//! leapfrog step size `epsilon` toward a target acceptance rate while a
//! coupler keeps the integer step count consistent with a fixed physical
//! trajectory time; at the warmup/sampling boundary the step size is frozen
//! to the converged running-average estimate and never touched again.
//!
//! To sample you provide a target implementing
//! [`static_uniform::HamiltonianTarget`] (log-density plus in-place
//! gradient). Chains are embarrassingly parallel: each one owns a full copy
//! of its state and RNG, and only the target is shared behind an `Arc`.
//!
//! ## Example: adaptively sampling a 2D Gaussian
//!
//! ```rust
//! use ndarray::arr1;
//! use static_hmc::adapt::AdaptiveStaticHmc;
//! use static_hmc::core::init_det;
//! use static_hmc::distributions::DiagGaussian;
//!
//! let target = DiagGaussian::new(arr1(&[0.0, 1.0]), arr1(&[1.0, 2.0]));
//!
//! // 4 chains, initial step size 0.1, trajectory time 1.0, 80% target accept.
//! let mut sampler =
//!     AdaptiveStaticHmc::new(target, init_det(4, 2), 0.1, 1.0, 0.8).set_seed(42);
//!
//! // 200 warmup (adaptive) transitions, then 200 collected per chain.
//! let sample = sampler.run(200, 200);
//! assert_eq!(sample.shape(), [4, 200, 2]);
//!
//! // Warmup ended: every chain's step size is frozen and positive.
//! assert!(sampler.nominal_epsilons().iter().all(|e| *e > 0.0));
//! ```
//!
//! ## Features
//! - **Dual-averaging step size adaptation** with the standard
//!   `gamma = 0.05`, `t0 = 10`, `kappa = 0.75` hyperparameters
//! - **Constant physical trajectory time**: the leapfrog step count follows
//!   the step size
//! - **Parallel chains** with per-chain progress bars, acceptance rates and
//!   R-hat via [`adapt::AdaptiveStaticHmc::run_progress`]
//! - **Divergence-safe**: non-finite Hamiltonians are absorbed as
//!   zero-probability states and never poison the adaptation

pub mod adapt;
pub mod core;
pub mod distributions;
pub mod euclidean;
pub mod sample;
pub mod static_uniform;
pub mod stats;
pub mod stepsize;
pub mod trajectory;
pub mod writer;
