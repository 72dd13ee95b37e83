//! Dual-averaging step size adaptation.
//!
//! During warmup the controller observes the acceptance statistic of each
//! transition and nudges the leapfrog step size toward a value whose long-run
//! acceptance rate matches `target_accept`. The recursion operates entirely in
//! log space, so the returned step size is always strictly positive. When
//! warmup ends, [`DualAveraging::complete_adaptation`] replaces the noisy
//! instantaneous step size with the weighted running-average estimate, which
//! is the statistically consistent one.

use num_traits::{Float, FromPrimitive};

/// Dual-averaging controller for the leapfrog step size.
///
/// Holds the full numeric state of the recursion:
/// - `mu`: log of 10x the initial step size, a fixed anchor,
/// - `h_bar`: weighted running average of `target_accept - accept_stat`,
/// - `log_epsilon_bar`: weighted running average of the log step size,
/// - `counter`: number of adaptation updates performed so far.
///
/// Hyperparameters follow the usual defaults: `gamma = 0.05`, `t0 = 10`,
/// `kappa = 0.75`. `log_epsilon_bar` and `h_bar` are meaningful only once
/// `counter >= 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct DualAveraging<T> {
    mu: T,
    log_epsilon_bar: T,
    h_bar: T,
    counter: u64,
    target_accept: T,
    gamma: T,
    t0: T,
    kappa: T,
    completed: bool,
}

impl<T> DualAveraging<T>
where
    T: Float + FromPrimitive,
{
    /// Creates a controller anchored at `initial_epsilon` that steers the
    /// long-run acceptance rate toward `target_accept`.
    ///
    /// # Panics
    ///
    /// Panics if `target_accept` is outside `(0, 1)` or `initial_epsilon` is
    /// not a strictly positive finite number.
    pub fn new(target_accept: T, initial_epsilon: T) -> Self {
        assert!(
            target_accept > T::zero() && target_accept < T::one(),
            "target_accept must lie strictly between 0 and 1"
        );
        assert!(
            initial_epsilon.is_finite() && initial_epsilon > T::zero(),
            "initial_epsilon must be a positive finite number"
        );
        Self {
            mu: (T::from_f64(10.0).unwrap() * initial_epsilon).ln(),
            log_epsilon_bar: T::zero(),
            h_bar: T::zero(),
            counter: 0,
            target_accept,
            gamma: T::from_f64(0.05).unwrap(),
            t0: T::from_f64(10.0).unwrap(),
            kappa: T::from_f64(0.75).unwrap(),
            completed: false,
        }
    }

    /// Overrides the adaptation hyperparameters.
    ///
    /// # Panics
    ///
    /// Panics unless `gamma > 0`, `t0 >= 0` and `kappa` lies in `(0, 1)`.
    pub fn with_hyperparams(mut self, gamma: T, t0: T, kappa: T) -> Self {
        assert!(gamma > T::zero(), "gamma must be positive");
        assert!(t0 >= T::zero(), "t0 must be non-negative");
        assert!(
            kappa > T::zero() && kappa < T::one(),
            "kappa must lie strictly between 0 and 1"
        );
        self.gamma = gamma;
        self.t0 = t0;
        self.kappa = kappa;
        self
    }

    /// Number of adaptation updates performed so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// Running average of the acceptance gap `target_accept - accept_stat`.
    pub fn h_bar(&self) -> T {
        self.h_bar
    }

    /// Running average of the log step size, the converged estimate that
    /// [`Self::complete_adaptation`] freezes.
    pub fn log_epsilon_bar(&self) -> T {
        self.log_epsilon_bar
    }

    pub fn target_accept(&self) -> T {
        self.target_accept
    }

    /// Performs one dual-averaging update and returns the next instantaneous
    /// step size.
    ///
    /// `accept_stat` is clamped to `[0, 1]`; a non-finite value (as produced
    /// by a divergent trajectory) counts as zero. The returned value is
    /// `exp(log_epsilon)` and therefore strictly positive for any input.
    ///
    /// # Panics
    ///
    /// Panics if called after [`Self::complete_adaptation`].
    pub fn learn_stepsize(&mut self, accept_stat: T) -> T {
        assert!(
            !self.completed,
            "learn_stepsize called after complete_adaptation"
        );
        let one = T::one();
        let stat = if accept_stat.is_finite() {
            accept_stat.max(T::zero()).min(one)
        } else {
            T::zero()
        };

        self.counter += 1;
        let m = T::from_u64(self.counter).unwrap();

        let eta = one / (m + self.t0);
        self.h_bar = (one - eta) * self.h_bar + eta * (self.target_accept - stat);

        let log_epsilon = self.mu - m.sqrt() / self.gamma * self.h_bar;
        let x_eta = m.powf(-self.kappa);
        self.log_epsilon_bar = x_eta * log_epsilon + (one - x_eta) * self.log_epsilon_bar;

        log_epsilon.exp()
    }

    /// Writes the converged running-average step size `exp(log_epsilon_bar)`
    /// into `epsilon` and makes the controller inert.
    ///
    /// If no update was ever performed the running average is undefined and
    /// `epsilon` is left untouched.
    ///
    /// # Panics
    ///
    /// Panics if called a second time.
    pub fn complete_adaptation(&mut self, epsilon: &mut T) {
        assert!(!self.completed, "complete_adaptation called twice");
        self.completed = true;
        if self.counter >= 1 {
            *epsilon = self.log_epsilon_bar.exp();
        }
    }

    /// True once [`Self::complete_adaptation`] has run.
    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn single_update_matches_hand_computation() {
        // target_accept = 0.8, eps_0 = 1 => mu = ln(10); one observation of 0.5.
        let mut da = DualAveraging::new(0.8_f64, 1.0);
        let eps = da.learn_stepsize(0.5);

        assert_eq!(da.counter(), 1);
        let h_bar = (0.8 - 0.5) / 11.0;
        assert_abs_diff_eq!(da.h_bar(), h_bar, epsilon = 1e-12);
        let log_epsilon = 10.0_f64.ln() - h_bar / 0.05;
        assert_abs_diff_eq!(eps, log_epsilon.exp(), epsilon = 1e-10);
        assert_abs_diff_eq!(eps, 5.80, epsilon = 0.01);
        // With counter = 1 the decay weight is 1, so the average equals the
        // instantaneous value.
        assert_abs_diff_eq!(da.log_epsilon_bar(), log_epsilon, epsilon = 1e-12);
    }

    #[test]
    fn stepsize_stays_positive_for_arbitrary_statistics() {
        let mut da = DualAveraging::new(0.65_f64, 0.3);
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..2_000 {
            let stat: f64 = rng.random();
            let eps = da.learn_stepsize(stat);
            assert!(eps > 0.0 && eps.is_finite(), "eps = {eps}");
        }
    }

    #[test]
    fn non_finite_statistic_counts_as_zero() {
        let mut reference = DualAveraging::new(0.8_f64, 1.0);
        let mut poisoned = DualAveraging::new(0.8_f64, 1.0);

        let eps_ref = reference.learn_stepsize(0.0);
        let eps_nan = poisoned.learn_stepsize(f64::NAN);
        assert_eq!(eps_ref, eps_nan);

        // The next update still produces a finite positive step size.
        let next = poisoned.learn_stepsize(0.9);
        assert!(next.is_finite() && next > 0.0);
        assert_eq!(next, reference.learn_stepsize(0.9));
    }

    #[test]
    fn out_of_range_statistic_is_clamped() {
        let mut high = DualAveraging::new(0.8_f64, 1.0);
        let mut one = DualAveraging::new(0.8_f64, 1.0);
        assert_eq!(high.learn_stepsize(3.5), one.learn_stepsize(1.0));

        let mut low = DualAveraging::new(0.8_f64, 1.0);
        let mut zero = DualAveraging::new(0.8_f64, 1.0);
        assert_eq!(low.learn_stepsize(-0.25), zero.learn_stepsize(0.0));
    }

    #[test]
    fn near_target_feedback_converges_without_oscillation() {
        let mut da = DualAveraging::new(0.8_f64, 0.5);
        let mut prev_bar = da.log_epsilon_bar();
        let mut deltas = Vec::new();
        for i in 0..500 {
            // Statistics oscillating symmetrically around the target.
            let stat = if i % 2 == 0 { 0.75 } else { 0.85 };
            da.learn_stepsize(stat);
            deltas.push((da.log_epsilon_bar() - prev_bar).abs());
            prev_bar = da.log_epsilon_bar();
        }

        // The acceptance gap averages out...
        assert_abs_diff_eq!(da.h_bar(), 0.0, epsilon = 1e-2);
        // ...and the increments of the running average shrink as the decay
        // weight m^(-kappa) does.
        assert!(deltas[499] < deltas[10]);
        assert!(deltas[499] < 1e-3, "late delta = {}", deltas[499]);
    }

    #[test]
    fn exactly_on_target_feedback_is_a_fixed_point() {
        // With accept_stat == target_accept the gap is zero, h_bar stays
        // zero, and every instantaneous step size equals exp(mu).
        let mut da = DualAveraging::new(0.8_f64, 0.5);
        let mu = (10.0_f64 * 0.5).ln();
        for _ in 0..50 {
            let eps = da.learn_stepsize(0.8);
            assert_abs_diff_eq!(eps, mu.exp(), epsilon = 1e-12);
        }
        assert_eq!(da.h_bar(), 0.0);
        assert_abs_diff_eq!(da.log_epsilon_bar(), mu, epsilon = 1e-12);
    }

    #[test]
    fn complete_adaptation_freezes_the_running_average() {
        let mut da = DualAveraging::new(0.8_f64, 1.0);
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..200 {
            // Oscillate around the target.
            let stat = 0.8 + 0.15 * (rng.random::<f64>() - 0.5);
            da.learn_stepsize(stat);
        }
        let expected = da.log_epsilon_bar().exp();

        let mut eps = 123.0;
        da.complete_adaptation(&mut eps);
        assert_eq!(eps, expected);
        assert!(da.is_completed());
    }

    #[test]
    fn complete_adaptation_without_updates_leaves_epsilon_untouched() {
        let mut da = DualAveraging::new(0.8_f64, 1.0);
        let mut eps = 0.25;
        da.complete_adaptation(&mut eps);
        assert_eq!(eps, 0.25);
    }

    #[test]
    #[should_panic(expected = "complete_adaptation called twice")]
    fn double_completion_panics() {
        let mut da = DualAveraging::new(0.8_f64, 1.0);
        let mut eps = 1.0;
        da.complete_adaptation(&mut eps);
        da.complete_adaptation(&mut eps);
    }

    #[test]
    #[should_panic(expected = "learn_stepsize called after complete_adaptation")]
    fn learning_after_completion_panics() {
        let mut da = DualAveraging::new(0.8_f64, 1.0);
        let mut eps = 1.0;
        da.complete_adaptation(&mut eps);
        da.learn_stepsize(0.5);
    }
}
