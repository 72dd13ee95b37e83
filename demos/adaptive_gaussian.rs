use ndarray::{arr1, Axis};
use static_hmc::adapt::AdaptiveStaticHmc;
use static_hmc::core::init_det;
use static_hmc::distributions::DiagGaussian;

/// Adaptively samples a 2D Gaussian with unequal scales and prints the
/// recovered moments together with the tuned per-chain step sizes.
fn main() {
    let target = DiagGaussian::new(arr1(&[0.0, 1.0]), arr1(&[1.0, 2.0]));

    // 4 chains, initial step size 0.1, trajectory time 1.0, 80% target accept.
    let mut sampler = AdaptiveStaticHmc::new(target, init_det(4, 2), 0.1, 1.0, 0.8).set_seed(42);

    // 500 warmup transitions tune epsilon, then 2000 draws per chain.
    let (sample, stats) = sampler
        .run_progress(2_000, 500)
        .expect("expected sampling to succeed");

    let n_total = sample.shape()[0] * sample.shape()[1];
    let stacked = sample
        .to_shape((n_total, 2))
        .expect("expected reshaping sample to succeed")
        .to_owned();
    println!("sample mean: {:.3}", stacked.mean_axis(Axis(0)).unwrap());
    println!("{stats}");
    println!("frozen step sizes: {:?}", sampler.nominal_epsilons());
    println!("trajectory lengths: {:?}", sampler.trajectory_lengths());
}
