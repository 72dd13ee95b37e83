//! The per-transition draw type shared between samplers and the adaptation layer.

use crate::euclidean::EuclideanVector;

/// One MCMC draw: a position, its unnormalized log-density, and the
/// Metropolis-type acceptance statistic realized by the transition that
/// produced it.
///
/// A `Sample` is transient: it is produced once per transition and owned by
/// the caller. The adaptation layer only ever reads [`Sample::accept_stat`].
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<V: EuclideanVector> {
    position: V,
    logp: V::Scalar,
    accept_stat: V::Scalar,
}

impl<V: EuclideanVector> Sample<V> {
    pub fn new(position: V, logp: V::Scalar, accept_stat: V::Scalar) -> Self {
        Self {
            position,
            logp,
            accept_stat,
        }
    }

    pub fn position(&self) -> &V {
        &self.position
    }

    /// Consumes the sample and returns its position.
    pub fn into_position(self) -> V {
        self.position
    }

    /// Unnormalized log-density at the position.
    pub fn logp(&self) -> V::Scalar {
        self.logp
    }

    /// Realized acceptance probability in `[0, 1]`, or a non-finite sentinel
    /// if the producing transition was numerically divergent. Consumers
    /// normalize non-finite values to zero.
    pub fn accept_stat(&self) -> V::Scalar {
        self.accept_stat
    }
}
