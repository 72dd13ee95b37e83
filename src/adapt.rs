//! Warmup adaptation around a static-trajectory sampler.
//!
//! [`AdaptiveChain`] wraps one [`TrajectorySampler`] together with a
//! [`DualAveraging`] controller and a [`TrajectoryLength`] coupler. While the
//! chain is in its warmup phase every transition feeds its acceptance
//! statistic into exactly one dual-averaging update and refreshes the step
//! count from the new step size. [`AdaptiveChain::disengage_adaptation`]
//! freezes the step size once, after which transitions leave it untouched.
//!
//! [`AdaptiveStaticHmc`] is the multi-chain front end: independent chains with
//! zero shared mutable state, run in parallel, with an optional progress view.

use crate::euclidean::EuclideanVector;
use crate::sample::Sample;
use crate::static_uniform::{HamiltonianTarget, StaticUniformChain, TrajectorySampler};
use crate::stats::{collect_rhat, ChainStats, ChainTracker, RunStats};
use crate::stepsize::DualAveraging;
use crate::trajectory::{TrajectoryLength, EPSILON_FLOOR};
use crate::writer::{DiagnosticWriter, NullWriter};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};
use ndarray_stats::QuantileExt;
use num_traits::{Float, FromPrimitive, ToPrimitive, Zero};
use rand::distr::Distribution as RandDistribution;
use rand_distr::{StandardNormal, StandardUniform};
use rayon::iter::{IndexedParallelIterator, IntoParallelRefMutIterator, ParallelIterator};
use std::error::Error;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Warmup lifecycle of a chain. The transition is one-way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Adapting,
    Frozen,
}

/// One adaptively tuned chain.
///
/// Owns the sampler, the step size controller, the trajectory-length coupler,
/// the nominal step size and the current step count. Nothing else mutates
/// these; the sampler receives step size and step count by value on every
/// call.
#[derive(Debug)]
pub struct AdaptiveChain<V, S, W = NullWriter>
where
    V: EuclideanVector,
{
    sampler: S,
    stepsize: DualAveraging<V::Scalar>,
    trajectory: TrajectoryLength<V::Scalar>,
    nominal_epsilon: V::Scalar,
    n_steps: usize,
    phase: Phase,
    writer: W,
}

impl<V, S> AdaptiveChain<V, S, NullWriter>
where
    V: EuclideanVector,
    V::Scalar: Float + FromPrimitive + ToPrimitive,
    S: TrajectorySampler<V>,
{
    /// Creates a chain in the adapting phase.
    ///
    /// `initial_epsilon` anchors the dual-averaging recursion, `target_time`
    /// is the fixed physical trajectory duration and `target_accept` the
    /// desired long-run acceptance rate.
    pub fn new(
        sampler: S,
        initial_epsilon: V::Scalar,
        target_time: V::Scalar,
        target_accept: V::Scalar,
    ) -> Self {
        Self::with_writer(sampler, initial_epsilon, target_time, target_accept, NullWriter)
    }
}

impl<V, S, W> AdaptiveChain<V, S, W>
where
    V: EuclideanVector,
    V::Scalar: Float + FromPrimitive + ToPrimitive,
    S: TrajectorySampler<V>,
    W: DiagnosticWriter,
{
    pub fn with_writer(
        sampler: S,
        initial_epsilon: V::Scalar,
        target_time: V::Scalar,
        target_accept: V::Scalar,
        writer: W,
    ) -> Self {
        let stepsize = DualAveraging::new(target_accept, initial_epsilon);
        let trajectory = TrajectoryLength::new(target_time);
        let n_steps = trajectory.n_steps(initial_epsilon);
        Self {
            sampler,
            stepsize,
            trajectory,
            nominal_epsilon: initial_epsilon,
            n_steps,
            phase: Phase::Adapting,
            writer,
        }
    }

    /// The step size the next transition will integrate with.
    pub fn nominal_epsilon(&self) -> V::Scalar {
        self.nominal_epsilon
    }

    /// The step count the next transition will integrate with.
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn is_adapting(&self) -> bool {
        self.phase == Phase::Adapting
    }

    /// Read-only view of the dual-averaging state.
    pub fn stepsize(&self) -> &DualAveraging<V::Scalar> {
        &self.stepsize
    }

    pub(crate) fn sampler_mut(&mut self) -> &mut S {
        &mut self.sampler
    }

    /// Wraps a raw position into the sample the transition loop starts from.
    pub fn init_sample(&mut self, position: V) -> Sample<V> {
        self.sampler.init_sample(position)
    }

    /// Advances the chain by one transition.
    ///
    /// While adapting, the acceptance statistic of the sample produced by
    /// this very call drives exactly one step size update, followed by one
    /// trajectory-length refresh. Once frozen, the call is a plain delegation
    /// to the sampler.
    pub fn transition(&mut self, init: &Sample<V>) -> Sample<V> {
        let new_sample = self
            .sampler
            .transition(init, self.nominal_epsilon, self.n_steps);

        if self.phase == Phase::Adapting {
            let next = self.stepsize.learn_stepsize(new_sample.accept_stat());
            self.nominal_epsilon = clamp_floor(next);
            self.n_steps = self.trajectory.n_steps(self.nominal_epsilon);
        }

        new_sample
    }

    /// Ends warmup: freezes the step size to the converged running-average
    /// estimate and recomputes the step count from it once.
    ///
    /// # Panics
    ///
    /// Panics if the chain is already frozen.
    pub fn disengage_adaptation(&mut self) {
        assert!(
            self.phase == Phase::Adapting,
            "disengage_adaptation called on a frozen chain"
        );
        self.stepsize.complete_adaptation(&mut self.nominal_epsilon);
        self.nominal_epsilon = clamp_floor(self.nominal_epsilon);
        self.n_steps = self.trajectory.n_steps(self.nominal_epsilon);
        self.phase = Phase::Frozen;

        self.writer.info(&format!(
            "step size adaptation complete: epsilon = {:.6}, trajectory length = {}",
            self.nominal_epsilon.to_f64().unwrap_or(f64::NAN),
            self.n_steps
        ));
    }
}

fn clamp_floor<T: Float + FromPrimitive>(epsilon: T) -> T {
    epsilon.max(T::from_f64(EPSILON_FLOOR).unwrap())
}

/// Adaptive static uniform HMC across multiple independent chains.
///
/// Each chain owns a full copy of the sampler state, controller and RNG;
/// parallelism is embarrassingly parallel with nothing shared but the target
/// behind an [`Arc`].
pub struct AdaptiveStaticHmc<V, Target>
where
    V: EuclideanVector,
    Target: HamiltonianTarget<V>,
{
    chains: Vec<AdaptiveChain<V, StaticUniformChain<V, Target>>>,
    positions: Vec<V>,
}

type RunResult<T> = Result<(Array3<T>, RunStats), Box<dyn Error>>;

impl<V, Target> AdaptiveStaticHmc<V, Target>
where
    V: EuclideanVector + Send,
    V::Scalar: Float + FromPrimitive + ToPrimitive + Send,
    Target: HamiltonianTarget<V> + Send + Sync,
    StandardNormal: RandDistribution<V::Scalar>,
    StandardUniform: RandDistribution<V::Scalar>,
{
    /// Creates one adaptive chain per initial position.
    ///
    /// # Panics
    ///
    /// Panics if `initial_positions` is empty.
    pub fn new(
        target: Target,
        initial_positions: Vec<V>,
        initial_epsilon: V::Scalar,
        target_time: V::Scalar,
        target_accept: V::Scalar,
    ) -> Self {
        assert!(
            !initial_positions.is_empty(),
            "initial_positions must not be empty"
        );
        let target = Arc::new(target);
        let chains = initial_positions
            .iter()
            .map(|_| {
                AdaptiveChain::new(
                    StaticUniformChain::new(Arc::clone(&target)),
                    initial_epsilon,
                    target_time,
                    target_accept,
                )
            })
            .collect();
        Self {
            chains,
            positions: initial_positions,
        }
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        for (i, chain) in self.chains.iter_mut().enumerate() {
            chain.sampler_mut().reseed(seed + i as u64 + 1);
        }
        self
    }

    /// Per-chain step sizes that the next transition would use.
    pub fn nominal_epsilons(&self) -> Vec<V::Scalar> {
        self.chains.iter().map(|c| c.nominal_epsilon()).collect()
    }

    /// Per-chain trajectory lengths that the next transition would use.
    pub fn trajectory_lengths(&self) -> Vec<usize> {
        self.chains.iter().map(|c| c.n_steps()).collect()
    }

    pub(crate) fn chains_mut(
        &mut self,
    ) -> &mut [AdaptiveChain<V, StaticUniformChain<V, Target>>] {
        &mut self.chains
    }

    /// Runs all chains in parallel: `n_warmup` adaptive transitions, one
    /// disengage per chain, then `n_collect` frozen transitions whose
    /// positions are returned as a `[n_chains, n_collect, dim]` array.
    pub fn run(&mut self, n_collect: usize, n_warmup: usize) -> Array3<V::Scalar> {
        let chain_samples: Vec<Array2<V::Scalar>> = self
            .chains
            .par_iter_mut()
            .zip(self.positions.par_iter_mut())
            .map(|(chain, position)| run_chain(chain, position, n_collect, n_warmup))
            .collect();
        let views: Vec<ArrayView2<V::Scalar>> = chain_samples.iter().map(|s| s.view()).collect();
        ndarray::stack(Axis(0), &views).expect("expected stacking chain samples to succeed")
    }

    /// Same as [`Self::run`] but with per-chain progress bars and live
    /// acceptance/R-hat messages, returning summary statistics alongside the
    /// sample.
    pub fn run_progress(&mut self, n_collect: usize, n_warmup: usize) -> RunResult<V::Scalar> {
        let chains = &mut self.chains;
        let positions = &mut self.positions;
        let n_chains = chains.len();

        let mut rxs: Vec<Receiver<ChainStats>> = vec![];
        let mut txs: Vec<Sender<ChainStats>> = vec![];
        (0..n_chains).for_each(|_| {
            let (tx, rx) = mpsc::channel();
            rxs.push(rx);
            txs.push(tx);
        });

        let progress_handle = thread::spawn(move || {
            let sleep_ms = Duration::from_millis(250);
            let timeout_ms = Duration::from_millis(0);
            let multi = MultiProgress::new();

            let pb_style = ProgressStyle::default_bar()
                .template("{prefix:8} {bar:40.cyan/blue} {pos}/{len} ({eta}) | {msg}")
                .unwrap()
                .progress_chars("=>-");
            let total: u64 = (n_collect + n_warmup).try_into().unwrap();

            let global_pb = multi.add(ProgressBar::new((rxs.len() as u64) * total));
            global_pb.set_style(pb_style.clone());
            global_pb.set_prefix("Global");

            let bars: Vec<ProgressBar> = (0..rxs.len())
                .map(|chain_idx| {
                    let pb = multi.add(ProgressBar::new(total));
                    pb.set_style(pb_style.clone());
                    pb.set_prefix(format!("Chain {chain_idx}"));
                    pb
                })
                .collect();

            let mut most_recent: Vec<Option<ChainStats>> = vec![None; rxs.len()];
            loop {
                for (i, rx) in rxs.iter().enumerate() {
                    while let Ok(stats) = rx.recv_timeout(timeout_ms) {
                        most_recent[i] = Some(stats)
                    }
                }

                let mut total_progress = 0;
                let mut avg_p_accept = 0.0;
                let mut n_available = 0.0;
                for (pb, stats) in bars.iter().zip(most_recent.iter()) {
                    if let Some(stats) = stats {
                        pb.set_position(stats.n);
                        pb.set_message(format!("p(accept)≈{:.2}", stats.p_accept));
                        total_progress += stats.n;
                        avg_p_accept += stats.p_accept;
                        n_available += 1.0;
                    }
                }
                global_pb.set_position(total_progress);

                let valid: Vec<&ChainStats> = most_recent.iter().flatten().collect();
                if valid.len() >= 2 {
                    let rhats = collect_rhat(valid.as_slice());
                    let max = rhats.max_skipnan();
                    global_pb.set_message(format!(
                        "p(accept)≈{:.2} max(rhat)≈{:.2}",
                        avg_p_accept / n_available,
                        max
                    ));
                }

                let n_finished = most_recent
                    .iter()
                    .flatten()
                    .filter(|stats| stats.n == total)
                    .count();
                if n_finished >= most_recent.len() {
                    break;
                }
                std::thread::sleep(sleep_ms);
            }
            for pb in bars {
                pb.finish();
            }
            global_pb.finish_with_message("Done!");
        });

        let results: Vec<(Array2<V::Scalar>, f64)> = thread::scope(|s| {
            let handles: Vec<thread::ScopedJoinHandle<(Array2<V::Scalar>, f64)>> = chains
                .iter_mut()
                .zip(positions.iter_mut())
                .zip(txs)
                .map(|((chain, position), tx)| {
                    s.spawn(move || {
                        run_chain_progress(chain, position, n_collect, n_warmup, tx)
                            .expect("expected running chain to succeed")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().expect("expected chain thread to finish"))
                .collect()
        });
        let (chain_samples, chain_accepts): (Vec<Array2<V::Scalar>>, Vec<f64>) =
            results.into_iter().unzip();
        let views: Vec<ArrayView2<V::Scalar>> = chain_samples.iter().map(|s| s.view()).collect();
        let sample = ndarray::stack(Axis(0), &views)?;

        if let Err(e) = progress_handle.join() {
            eprintln!("Progress bar thread emitted error message: {:?}", e);
        }

        let final_stats: Vec<ChainStats> = chain_samples
            .iter()
            .zip(&chain_accepts)
            .map(|(obs, accept)| ChainStats::from_draws(obs.view(), *accept))
            .collect();
        let refs: Vec<&ChainStats> = final_stats.iter().collect();
        Ok((sample, RunStats::from_chain_stats(&refs)))
    }
}

fn run_chain<V, S, W>(
    chain: &mut AdaptiveChain<V, S, W>,
    position: &mut V,
    n_collect: usize,
    n_warmup: usize,
) -> Array2<V::Scalar>
where
    V: EuclideanVector,
    V::Scalar: Float + FromPrimitive + ToPrimitive,
    S: TrajectorySampler<V>,
    W: DiagnosticWriter,
{
    let dim = position.len();
    let mut current = chain.init_sample(position.clone());

    for _ in 0..n_warmup {
        current = chain.transition(&current);
    }
    if chain.is_adapting() {
        chain.disengage_adaptation();
    }

    let mut out = Array2::<V::Scalar>::zeros((n_collect, dim));
    let mut scratch = vec![V::Scalar::zero(); dim];
    for i in 0..n_collect {
        current = chain.transition(&current);
        current.position().write_to_slice(&mut scratch);
        out.slice_mut(s![i, ..]).assign(&ArrayView1::from(&scratch));
    }

    position.assign(current.position());
    out
}

fn run_chain_progress<V, S, W>(
    chain: &mut AdaptiveChain<V, S, W>,
    position: &mut V,
    n_collect: usize,
    n_warmup: usize,
    tx: Sender<ChainStats>,
) -> Result<(Array2<V::Scalar>, f64), Box<dyn Error>>
where
    V: EuclideanVector,
    V::Scalar: Float + FromPrimitive + ToPrimitive,
    S: TrajectorySampler<V>,
    W: DiagnosticWriter,
{
    let dim = position.len();
    let mut current = chain.init_sample(position.clone());
    let mut scratch = vec![V::Scalar::zero(); dim];

    let mut tracker = ChainTracker::new(dim);
    let mut last = Instant::now();
    let freq = Duration::from_secs(1);
    let total = n_warmup + n_collect;

    let mut out = Array2::<V::Scalar>::zeros((n_collect, dim));
    let mut accept_sum = 0.0;
    for i in 0..total {
        if i == n_warmup && chain.is_adapting() {
            chain.disengage_adaptation();
        }
        current = chain.transition(&current);

        current.position().write_to_slice(&mut scratch);
        let accept = current
            .accept_stat()
            .to_f64()
            .filter(|a| a.is_finite())
            .unwrap_or(0.0);
        tracker.step(accept, &scratch)?;

        let now = Instant::now();
        if (now >= last + freq) | (i == total - 1) {
            if let Err(e) = tx.send(tracker.stats()) {
                eprintln!("Sending chain statistics failed: {e}");
            }
            last = now;
        }

        if i >= n_warmup {
            accept_sum += accept.clamp(0.0, 1.0);
            out.slice_mut(s![i - n_warmup, ..])
                .assign(&ArrayView1::from(&scratch));
        }
    }

    position.assign(current.position());
    let p_accept = if n_collect > 0 {
        accept_sum / n_collect as f64
    } else {
        0.0
    };
    Ok((out, p_accept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::Sample;
    use ndarray::{arr1, Array1};

    /// Scripted stand-in for the HMC sampler: replays a fixed sequence of
    /// acceptance statistics and records what it was called with.
    struct ScriptedSampler {
        stats: Vec<f64>,
        calls: Vec<(f64, usize)>,
    }

    impl ScriptedSampler {
        fn new(stats: Vec<f64>) -> Self {
            Self {
                stats,
                calls: vec![],
            }
        }
    }

    impl TrajectorySampler<Array1<f64>> for ScriptedSampler {
        fn init_sample(&mut self, position: Array1<f64>) -> Sample<Array1<f64>> {
            Sample::new(position, 0.0, 1.0)
        }

        fn transition(
            &mut self,
            init: &Sample<Array1<f64>>,
            epsilon: f64,
            n_steps: usize,
        ) -> Sample<Array1<f64>> {
            self.calls.push((epsilon, n_steps));
            let stat = self.stats[(self.calls.len() - 1) % self.stats.len()];
            Sample::new(init.position().clone(), 0.0, stat)
        }
    }

    fn scripted_chain(stats: Vec<f64>) -> AdaptiveChain<Array1<f64>, ScriptedSampler> {
        AdaptiveChain::new(ScriptedSampler::new(stats), 1.0, 2.0, 0.8)
    }

    #[test]
    fn one_adaptation_update_per_transition() {
        let mut chain = scripted_chain(vec![0.3, 0.9, 0.6]);
        let mut current = chain.init_sample(arr1(&[0.0]));
        for k in 1..=12_u64 {
            current = chain.transition(&current);
            assert_eq!(chain.stepsize().counter(), k);
        }
        assert_eq!(chain.sampler_mut().calls.len(), 12);
    }

    #[test]
    fn sampler_sees_the_epsilon_that_preceded_its_statistic() {
        let mut chain = scripted_chain(vec![0.5]);
        let eps_before = chain.nominal_epsilon();
        let current = chain.init_sample(arr1(&[0.0]));
        chain.transition(&current);
        // The call the sampler observed used the pre-update step size.
        assert_eq!(chain.sampler_mut().calls[0].0, eps_before);
        assert_ne!(chain.nominal_epsilon(), eps_before);
    }

    #[test]
    fn step_count_tracks_the_current_stepsize() {
        let mut chain = scripted_chain(vec![0.2, 0.95, 0.7, 0.4]);
        let coupler = TrajectoryLength::new(2.0_f64);
        let mut current = chain.init_sample(arr1(&[0.0]));
        for _ in 0..20 {
            current = chain.transition(&current);
            assert_eq!(chain.n_steps(), coupler.n_steps(chain.nominal_epsilon()));
            assert!(chain.n_steps() >= 1);
        }
    }

    #[test]
    fn disengage_freezes_the_running_average() {
        let mut chain = scripted_chain(vec![0.75, 0.85, 0.8, 0.78, 0.82]);
        let mut current = chain.init_sample(arr1(&[0.0]));
        for _ in 0..100 {
            current = chain.transition(&current);
        }
        let expected = chain.stepsize().log_epsilon_bar().exp();
        chain.disengage_adaptation();

        assert!(!chain.is_adapting());
        assert_eq!(chain.nominal_epsilon(), expected);

        let frozen_eps = chain.nominal_epsilon();
        let frozen_steps = chain.n_steps();
        for _ in 0..50 {
            current = chain.transition(&current);
            assert_eq!(chain.nominal_epsilon(), frozen_eps);
            assert_eq!(chain.n_steps(), frozen_steps);
        }
        // The sampler keeps being handed the frozen values.
        let (eps, n) = *chain.sampler_mut().calls.last().unwrap();
        assert_eq!(eps, frozen_eps);
        assert_eq!(n, frozen_steps);
    }

    #[test]
    #[should_panic(expected = "disengage_adaptation called on a frozen chain")]
    fn double_disengage_panics() {
        let mut chain = scripted_chain(vec![0.8]);
        let current = chain.init_sample(arr1(&[0.0]));
        chain.transition(&current);
        chain.disengage_adaptation();
        chain.disengage_adaptation();
    }

    #[test]
    fn divergent_statistic_does_not_poison_the_chain() {
        let mut chain = scripted_chain(vec![f64::NAN, 0.9, f64::NAN, 0.8]);
        let mut current = chain.init_sample(arr1(&[0.0]));
        for _ in 0..40 {
            current = chain.transition(&current);
            let eps = chain.nominal_epsilon();
            assert!(eps.is_finite() && eps > 0.0, "eps = {eps}");
        }
    }

    #[test]
    fn multi_chain_run_has_expected_shape_and_frozen_stepsizes() {
        use crate::distributions::DiagGaussian;

        let target = DiagGaussian::new(arr1(&[0.0, 0.0]), arr1(&[1.0, 1.0]));
        let positions = vec![arr1(&[0.5, 0.5]), arr1(&[-0.5, -0.5]), arr1(&[1.0, -1.0])];
        let mut sampler = AdaptiveStaticHmc::new(target, positions, 0.2, 1.0, 0.8).set_seed(42);

        let sample = sampler.run(100, 150);
        assert_eq!(sample.shape(), [3, 100, 2]);

        let epsilons = sampler.nominal_epsilons();
        for (chain, eps) in sampler.chains_mut().iter().zip(epsilons) {
            assert!(!chain.is_adapting());
            assert!(eps > 0.0 && eps.is_finite());
        }
        assert!(sampler.trajectory_lengths().iter().all(|l| *l >= 1));
    }
}
