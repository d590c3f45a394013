//! Laplace approximation of the posterior of the latent gaussian process
//! given binary observations with a logistic likelihood.
//!
//! The posterior `p(a|y)` over the latent logits `a` at training points is approximated by
//! a gaussian centered at its mode `a_h` with a covariance given by the local curvature.
//! The mode is found with Newton iterations, see Rasmussen & Williams,
//! [Gaussian Processes for Machine Learning](http://gaussianprocess.org/gpml/chapters/RW3.pdf),
//! chapter 3.
//!
//! All functions here are pure: they take the gram matrix `K_a` (including the nugget)
//! and the labels and do not keep any state between calls.

use crate::errors::Result;
use crate::utils::{
    cholesky_inverse, cholesky_logdet, pinvh, scale_rows, sigmoid, slogdet_sym, softplus,
};
use linfa::Float;
use linfa_linalg::{cholesky::*, triangular::*};
use log::{debug, warn};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};

/// Relative cutoff used when the Newton system has to be pseudo-inverted
const PINV_RCOND: f64 = 1e-12;

/// Diagonal of the weight matrix `W = diag(sigmoid(a) * (1 - sigmoid(a)))`,
/// i.e. the Bernoulli variances at the latent values `a`.
pub fn weights<F: Float>(a: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array1<F> {
    a.mapv(|v| {
        let p = sigmoid(v);
        p * (F::one() - p)
    })
}

/// Factorization of the symmetric Newton matrix `B = I + W^1/2 K W^1/2`.
///
/// `B` eigenvalues being greater than one, the cholesky decomposition is expected
/// to succeed. Otherwise we fall back to a pseudo-inverse of `B` which results
/// in least-squares solutions.
pub(crate) enum NewtonFactor<F: Float> {
    /// Lower triangular cholesky factor of `B`
    Cholesky(Array2<F>),
    /// Pseudo-inverse of `B`
    PseudoInverse(Array2<F>),
}

impl<F: Float> NewtonFactor<F> {
    /// Factorize `B` given `w_sqrt`, the square roots of `W` diagonal, and the gram matrix `k`
    pub(crate) fn new(
        w_sqrt: &ArrayBase<impl Data<Elem = F>, Ix1>,
        k: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Self> {
        let mut b = scale_rows(w_sqrt, &scale_rows(w_sqrt, k).t());
        b.diag_mut().mapv_inplace(|v| v + F::one());
        match b.cholesky() {
            Ok(l) => Ok(NewtonFactor::Cholesky(l)),
            Err(err) => {
                warn!("Newton matrix cholesky decomposition failed ({err}), use pseudo-inverse");
                Ok(NewtonFactor::PseudoInverse(pinvh(&b, F::cast(PINV_RCOND))?))
            }
        }
    }

    /// Solve `B x = rhs`
    pub(crate) fn solve(&self, rhs: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array2<F>> {
        match self {
            NewtonFactor::Cholesky(l) => {
                let z = l.solve_triangular(rhs, UPLO::Lower)?;
                Ok(l.t().solve_triangular_into(z, UPLO::Upper)?)
            }
            NewtonFactor::PseudoInverse(pinv) => Ok(pinv.dot(rhs)),
        }
    }

    /// Compute `diag(rhs^T B^-1 rhs)`, i.e. `colsum(rhs .* B^-1 rhs)`
    pub(crate) fn quad_diag(&self, rhs: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        match self {
            NewtonFactor::Cholesky(l) => {
                let v = l.solve_triangular(rhs, UPLO::Lower)?;
                Ok(v.mapv(|v| v * v).sum_axis(Axis(0)))
            }
            NewtonFactor::PseudoInverse(pinv) => {
                Ok((pinv.dot(rhs) * rhs).sum_axis(Axis(0)))
            }
        }
    }
}

/// One Newton step for the mode of `log p(y|a) + log p(a|0, K)`:
///
/// `a_new = K (I + W K)^-1 (y - sigmoid(a) + W a)`
///
/// where the inverse is applied using `K (I + W K)^-1 b = K b - K W^1/2 B^-1 W^1/2 K b`
/// to only factorize the symmetric matrix `B` and never form `K^-1`.
fn newton_step<F: Float>(
    k: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    a: &Array1<F>,
) -> Result<Array1<F>> {
    let w = weights(a);
    let w_sqrt = w.mapv(|v| v.sqrt());
    let factor = NewtonFactor::new(&w_sqrt, k)?;

    let mut b = &w * a;
    Zip::from(&mut b)
        .and(y)
        .and(a)
        .for_each(|bi, &yi, &ai| *bi += yi - sigmoid(ai));

    let kb = k.dot(&b);
    let rhs = (&w_sqrt * &kb).insert_axis(Axis(1));
    let c = factor.solve(&rhs)?.remove_axis(Axis(1));
    Ok(kb - k.dot(&(&w_sqrt * &c)))
}

/// Find the mode of the latent posterior `p(a|y)` starting from `a = 0`.
///
/// `k` is the gram matrix `K_a` (with nugget) of the training points, `y` the labels in {0, 1}.
/// Newton iterations stop when no component changes by more than `tol` or after `max_iter`
/// iterations. Reaching `max_iter` is not an error: the last iterate is returned.
pub fn posterior_mode<F: Float>(
    k: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    max_iter: usize,
    tol: F,
) -> Array1<F> {
    posterior_mode_from(k, y, &Array1::zeros(y.len()), max_iter, tol)
}

/// Find the mode of the latent posterior `p(a|y)` starting from the given `a0`.
/// See [posterior_mode].
pub fn posterior_mode_from<F: Float>(
    k: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    a0: &ArrayBase<impl Data<Elem = F>, Ix1>,
    max_iter: usize,
    tol: F,
) -> Array1<F> {
    let mut a = a0.to_owned();
    for i in 0..max_iter {
        let a_new = match newton_step(k, y, &a) {
            Ok(a_new) => a_new,
            Err(err) => {
                warn!("Newton iteration {i} failed ({err}), keep current latent mode");
                return a;
            }
        };
        let converged = a_new
            .iter()
            .zip(a.iter())
            .all(|(&an, &ao)| num_traits::float::Float::abs(an - ao) <= tol);
        a = a_new;
        if converged {
            debug!("Newton converged after {} iteration(s)", i + 1);
            break;
        }
    }
    a
}

/// Laplace approximation of the latent posterior at training points,
/// used for predictions.
pub(crate) struct LaplaceApprox<F: Float> {
    /// Mode of the latent posterior
    pub mode: Array1<F>,
    /// Square roots of the weights `W` at the mode
    pub w_sqrt: Array1<F>,
    /// Factorization of `B = I + W^1/2 K W^1/2` at the mode
    pub factor: NewtonFactor<F>,
}

impl<F: Float> LaplaceApprox<F> {
    /// Compute the approximation given the gram matrix `k` and labels `y`
    pub(crate) fn new(
        k: &ArrayBase<impl Data<Elem = F>, Ix2>,
        y: &ArrayBase<impl Data<Elem = F>, Ix1>,
        max_iter: usize,
        tol: F,
    ) -> Result<Self> {
        let mode = posterior_mode(k, y, max_iter, tol);
        let w_sqrt = weights(&mode).mapv(|v| v.sqrt());
        let factor = NewtonFactor::new(&w_sqrt, k)?;
        Ok(LaplaceApprox {
            mode,
            w_sqrt,
            factor,
        })
    }

    /// Gradient of the log likelihood at the mode `y - sigmoid(a_h)`
    pub(crate) fn residuals(&self, y: &ArrayBase<impl Data<Elem = F>, Ix1>) -> Array1<F> {
        let mut res = y.to_owned();
        Zip::from(&mut res)
            .and(&self.mode)
            .for_each(|r, &a| *r -= sigmoid(a));
        res
    }

    /// Compute `diag(K_s^T (W^-1 + K)^-1 K_s)` given the cross covariance `k_s` (n, m)
    /// between training points and m query points.
    /// `(W^-1 + K)^-1` is applied as `W^1/2 B^-1 W^1/2` so that `W` is never inverted.
    pub(crate) fn variance_reduction(
        &self,
        k_s: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<Array1<F>> {
        let v = scale_rows(&self.w_sqrt, k_s);
        self.factor.quad_diag(&v)
    }
}

/// Laplace approximation of the log marginal likelihood `log p(y|X, theta)`:
///
/// `-1/2 a^T K^-1 a - 1/2 log|K| - 1/2 log|W + K^-1| + y^T a - sum(log(1 + exp(a)))`
///
/// where `a` is the posterior mode, `k` the gram matrix `K_a` (with nugget) and `y` the labels.
/// `K` is inverted exactly: an error is returned when it is not numerically positive definite.
/// Log determinants are computed from decompositions, not from determinant values.
pub fn laplace_likelihood<F: Float>(
    k: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    max_iter: usize,
    tol: F,
) -> Result<F> {
    let k_chol = k.cholesky()?;
    let k_inv = cholesky_inverse(&k_chol)?;

    let a = posterior_mode(k, y, max_iter, tol);
    let w = weights(&a);

    let quad = a.dot(&k_inv.dot(&a));
    let logdet_k = cholesky_logdet(&k_chol);
    let mut wk = k_inv;
    Zip::from(wk.diag_mut()).and(&w).for_each(|v, &wi| *v += wi);
    let (_, logdet_wk) = slogdet_sym(&wk)?;

    let half = F::cast(0.5);
    Ok(-half * quad - half * logdet_k - half * logdet_wk + y.dot(&a)
        - a.mapv(softplus).sum())
}
