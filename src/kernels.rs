//! A module for the covariance kernel of the latent gaussian process.
//!
//! Only the isotropic squared exponential kernel is implemented:
//!
//! `k(x, x') = signal_std^2 * exp(-||x - x'||^2 / (2 * length_scale^2))`

use crate::utils::pairwise_sq_distances;
use linfa::Float;
use ndarray::{Array, Array1, Array2, ArrayBase, Data, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hyperparameters of the squared exponential kernel
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct KernelParams<F: Float> {
    /// Length scale `l > 0`
    pub length_scale: F,
    /// Signal standard deviation `s >= 0`, `s^2` being the process variance
    pub signal_std: F,
}

impl<F: Float> Default for KernelParams<F> {
    fn default() -> Self {
        KernelParams {
            length_scale: F::one(),
            signal_std: F::one(),
        }
    }
}

impl<F: Float> KernelParams<F> {
    /// Constructor
    pub fn new(length_scale: F, signal_std: F) -> Self {
        KernelParams {
            length_scale,
            signal_std,
        }
    }

    /// Hyperparameters as an array `[length_scale, signal_std]`
    pub fn to_array(&self) -> Array1<F> {
        ndarray::array![self.length_scale, self.signal_std]
    }

    /// Build hyperparameters from their log10 values `[log10(length_scale), log10(signal_std)]`
    pub(crate) fn from_log10(x: &[f64]) -> Self {
        let base: f64 = 10.;
        KernelParams {
            length_scale: F::cast(base.powf(x[0])),
            signal_std: F::cast(base.powf(x[1])),
        }
    }

    /// Returns true when one of the hyperparameters is NaN
    pub(crate) fn has_nan(&self) -> bool {
        self.length_scale.is_nan() || self.signal_std.is_nan()
    }
}

impl<F: Float> fmt::Display for KernelParams<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "(length_scale={}, signal_std={})",
            self.length_scale, self.signal_std
        )
    }
}

/// Squared exponential (aka RBF) covariance kernel
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct SquaredExponentialKernel();

impl SquaredExponentialKernel {
    /// Compute covariance matrix `K(x1, x2)` of shape (m, n)
    /// given `x1` (m, nx) and `x2` (n, nx) point sets.
    ///
    /// Hyperparameters are not checked: `length_scale > 0` and `signal_std >= 0` are
    /// expected to be enforced by the caller.
    pub fn value<F: Float>(
        &self,
        x1: &ArrayBase<impl Data<Elem = F>, Ix2>,
        x2: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &KernelParams<F>,
    ) -> Array2<F> {
        let s2 = theta.signal_std * theta.signal_std;
        let two_l2 = F::cast(2.) * theta.length_scale * theta.length_scale;
        pairwise_sq_distances(x1, x2).mapv(|d| s2 * (-d / two_l2).exp())
    }

    /// Compute the gram matrix `K(x, x) + nugget * I` of shape (n, n)
    pub fn gram<F: Float>(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
        theta: &KernelParams<F>,
        nugget: F,
    ) -> Array2<F> {
        let mut k = self.value(x, x, theta);
        k.diag_mut().mapv_inplace(|v| v + nugget);
        k
    }

    /// Compute the diagonal of the gram matrix for `n` points without building the matrix.
    /// The kernel being stationary, the self covariance is the constant `signal_std^2 + nugget`.
    pub fn diag<F: Float>(&self, n: usize, theta: &KernelParams<F>, nugget: F) -> Array1<F> {
        Array::from_elem(n, theta.signal_std * theta.signal_std + nugget)
    }
}

impl fmt::Display for SquaredExponentialKernel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SquaredExponential")
    }
}
