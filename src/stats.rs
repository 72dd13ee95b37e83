//! Running acceptance and convergence statistics for adaptive chains.

use core::fmt;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_traits::ToPrimitive;
use std::error::Error;

/// Tracks statistics for a single chain as it advances.
///
/// Keeps running per-parameter means and second moments plus the running mean
/// of the realized acceptance statistic, which the samplers hand over
/// directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTracker {
    n_params: usize,
    n: u64,
    accept_sum: f64,
    mean: Array1<f64>,    // n_params
    mean_sq: Array1<f64>, // n_params
}

/// Snapshot of a chain's statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub n: u64,
    /// Mean realized acceptance statistic, as reported by the sampler.
    pub p_accept: f64,
    pub mean: Array1<f64>, // n_params
    pub sm2: Array1<f64>,  // n_params
}

impl ChainTracker {
    pub fn new(n_params: usize) -> Self {
        Self {
            n_params,
            n: 0,
            accept_sum: 0.0,
            mean: Array1::zeros(n_params),
            mean_sq: Array1::zeros(n_params),
        }
    }

    /// Records one transition: its acceptance statistic and the state it
    /// produced.
    pub fn step<T>(&mut self, accept_stat: f64, state: &[T]) -> Result<(), Box<dyn Error>>
    where
        T: ToPrimitive + Clone,
    {
        self.n += 1;
        let n = self.n as f64;

        let x = ArrayView1::from_shape(self.n_params, state)?.mapv(|v| {
            v.to_f64()
                .expect("expected conversion of state elements to f64 to succeed")
        });

        self.mean = (self.mean.clone() * (n - 1.0) + x.clone()) / n;
        if self.n == 1 {
            self.mean_sq = x.pow2();
        } else {
            self.mean_sq = (self.mean_sq.clone() * (n - 1.0) + x.pow2()) / n;
        }
        self.accept_sum += accept_stat.clamp(0.0, 1.0);

        Ok(())
    }

    pub fn stats(&self) -> ChainStats {
        let n = self.n as f64;
        let sm2 = if self.n >= 2 {
            (self.mean_sq.clone() - self.mean.pow2()) * n / (n - 1.0)
        } else {
            Array1::zeros(self.n_params)
        };
        ChainStats {
            n: self.n,
            p_accept: if self.n > 0 { self.accept_sum / n } else { 0.0 },
            mean: self.mean.clone(),
            sm2,
        }
    }
}

impl ChainStats {
    /// Computes a chain's moment statistics from an already collected
    /// `[n_steps, n_params]` block. The acceptance probability cannot be
    /// recovered from the positions alone (the trajectory draw regularly
    /// re-selects the current state without rejecting), so the caller
    /// supplies the mean acceptance statistic it accumulated.
    pub fn from_draws<T>(sample: ArrayView2<T>, p_accept: f64) -> Self
    where
        T: ToPrimitive + Copy,
    {
        let sample = sample.mapv(|v| {
            v.to_f64()
                .expect("expected conversion of sample elements to f64 to succeed")
        });
        let n = sample.nrows() as u64;
        let mean = sample
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(sample.ncols()));
        let sm2 = if n >= 2 {
            sample.var_axis(Axis(0), 1.0)
        } else {
            Array1::zeros(sample.ncols())
        };

        Self {
            n,
            p_accept: p_accept.clamp(0.0, 1.0),
            mean,
            sm2,
        }
    }
}

/// Computes the Potential Scale Reduction Factor (R-hat) per parameter from
/// per-chain means and variances.
pub fn collect_rhat(chain_stats: &[&ChainStats]) -> Array1<f64> {
    let (within, var) = within_and_var(chain_stats);
    (var / within).sqrt()
}

fn within_and_var(chain_stats: &[&ChainStats]) -> (Array1<f64>, Array1<f64>) {
    let means: Vec<ArrayView1<f64>> = chain_stats.iter().map(|x| x.mean.view()).collect();
    let means = ndarray::stack(Axis(0), &means).expect("expected stacking means to succeed");
    let sm2s: Vec<ArrayView1<f64>> = chain_stats.iter().map(|x| x.sm2.view()).collect();
    let sm2s = ndarray::stack(Axis(0), &sm2s).expect("expected stacking variances to succeed");

    let within = sm2s
        .mean_axis(Axis(0))
        .expect("expected within-chain variance computation to succeed");
    let global_means = means
        .mean_axis(Axis(0))
        .expect("expected global mean computation to succeed");
    let diffs: Array2<f64> = (means.clone()
        - global_means
            .broadcast(means.shape())
            .expect("expected broadcasting global means to succeed"))
    .into_dimensionality()
    .expect("expected casting dimensionality to succeed");
    let between = diffs.pow2().sum_axis(Axis(0)) / (diffs.nrows() - 1) as f64;

    let n: f64 =
        chain_stats.iter().map(|x| x.n as f64).sum::<f64>() / chain_stats.len() as f64;
    let var = between + within.clone() * ((n - 1.0) / n);
    (within, var)
}

/// Summary diagnostics of a finished multi-chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStats {
    /// Acceptance probability averaged across chains.
    pub p_accept: f64,
    /// R-hat per parameter.
    pub rhat: Array1<f64>,
}

impl RunStats {
    pub fn from_chain_stats(chain_stats: &[&ChainStats]) -> Self {
        let p_accept = if chain_stats.is_empty() {
            0.0
        } else {
            chain_stats.iter().map(|s| s.p_accept).sum::<f64>() / chain_stats.len() as f64
        };
        let rhat = if chain_stats.len() >= 2 {
            collect_rhat(chain_stats)
        } else {
            Array1::zeros(chain_stats.first().map_or(0, |s| s.mean.len()))
        };
        Self { p_accept, rhat }
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "p(accept) ≈ {:.3}", self.p_accept)?;
        write!(f, "rhat: {:.3}", self.rhat)
    }
}
