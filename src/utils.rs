use crate::errors::Result;
use linfa::Float;
use linfa_linalg::{eigh::*, triangular::*};
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix1, Ix2, Zip};

/// Computes squared euclidean distances between each row of x and each row of y
/// resulting in a 2d array of shape (nrows(x), nrows(y))
/// *Panics* if x and y have not the same column numbers
pub fn pairwise_sq_distances<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    assert!(x.ncols() == y.ncols());
    let mut d = Array2::zeros((x.nrows(), y.nrows()));
    Zip::from(d.rows_mut())
        .and(x.rows())
        .for_each(|mut drow, xi| {
            Zip::from(&mut drow).and(y.rows()).for_each(|dij, yj| {
                *dij = Zip::from(&xi)
                    .and(&yj)
                    .fold(F::zero(), |acc, &a, &b| acc + (a - b) * (a - b));
            });
        });
    d
}

/// Logistic function `1 / (1 + exp(-a))` evaluated without overflow for large |a|
#[inline]
pub fn sigmoid<F: Float>(a: F) -> F {
    if a >= F::zero() {
        F::one() / (F::one() + (-a).exp())
    } else {
        let e = a.exp();
        e / (F::one() + e)
    }
}

/// `log(1 + exp(a))` evaluated without overflow for large a
#[inline]
pub fn softplus<F: Float>(a: F) -> F {
    let m = if a > F::zero() { a } else { F::zero() };
    m + (-num_traits::float::Float::abs(a)).exp().ln_1p()
}

/// Solves `L L^T x = b` given the lower cholesky factor `L`
pub(crate) fn cholesky_solve<F: Float>(
    l: &ArrayBase<impl Data<Elem = F>, Ix2>,
    b: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    let z = l.solve_triangular(b, UPLO::Lower)?;
    Ok(l.t().solve_triangular_into(z, UPLO::Upper)?)
}

/// Log determinant of a symmetric positive definite matrix given its lower cholesky factor
pub(crate) fn cholesky_logdet<F: Float>(l: &ArrayBase<impl Data<Elem = F>, Ix2>) -> F {
    l.diag().mapv(|v| v.ln()).sum() * F::cast(2.)
}

/// Inverse of a symmetric positive definite matrix given its lower cholesky factor
pub(crate) fn cholesky_inverse<F: Float>(
    l: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<Array2<F>> {
    let inv = cholesky_solve(l, &Array2::eye(l.nrows()))?;
    Ok(symmetrize(&inv))
}

/// Returns `(sign, log|det(m)|)` of a symmetric matrix from its eigenvalues
pub(crate) fn slogdet_sym<F: Float>(m: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<(F, F)> {
    let (eigvals, _) = symmetrize(m).eigh_into()?;
    let sign = eigvals.fold(F::one(), |acc, &v| {
        if v < F::zero() {
            -acc
        } else if v == F::zero() {
            F::zero()
        } else {
            acc
        }
    });
    let logabsdet = eigvals
        .mapv(|v| num_traits::float::Float::abs(v).ln())
        .sum();
    Ok((sign, logabsdet))
}

/// Pseudo-inverse of a symmetric positive semi-definite matrix.
/// Eigenvalues below `rcond * max(eigenvalues)` are treated as zero.
pub(crate) fn pinvh<F: Float>(m: &ArrayBase<impl Data<Elem = F>, Ix2>, rcond: F) -> Result<Array2<F>> {
    let (eigvals, eigvecs) = symmetrize(m).eigh_into()?;
    let vmax = eigvals
        .iter()
        .fold(F::zero(), |acc, &v| if v > acc { v } else { acc });
    let cutoff = rcond * vmax;
    let inv_vals: Array1<F> = eigvals.mapv(|v| if v > cutoff { F::one() / v } else { F::zero() });
    let scaled = &eigvecs * &inv_vals.insert_axis(Axis(0));
    Ok(scaled.dot(&eigvecs.t()))
}

/// Returns `(m + m^T) / 2`
pub(crate) fn symmetrize<F: Float>(m: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
    (m.to_owned() + m.t()).mapv(|v| v * F::cast(0.5))
}

/// Scales rows of `m` by the components of `s`, i.e. computes `diag(s) m`
pub(crate) fn scale_rows<F: Float>(
    s: &ArrayBase<impl Data<Elem = F>, Ix1>,
    m: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Array2<F> {
    let mut res = m.to_owned();
    Zip::from(res.rows_mut())
        .and(s)
        .for_each(|mut row, &si| row.mapv_inplace(|v| v * si));
    res
}
