use ndarray::{Array, Array1, Array2, Axis, Zip};
use ndarray_rand::rand::SeedableRng;
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand_xoshiro::Xoshiro256Plus;

pub(crate) struct CobylaParams {
    pub rhobeg: f64,
    pub ftol_rel: f64,
    pub maxeval: usize,
}

impl Default for CobylaParams {
    fn default() -> Self {
        CobylaParams {
            rhobeg: 0.5,
            ftol_rel: 1e-4,
            maxeval: 200,
        }
    }
}

/// Returns `n_start + 1` starting points as rows, the first one being `param0`,
/// the others drawn uniformly within `bounds` (given on the same scale as `param0`).
pub(crate) fn prepare_multistart(
    n_start: usize,
    param0: &Array1<f64>,
    bounds: &[(f64, f64)],
) -> Array2<f64> {
    let mut params0 = Array2::zeros((n_start + 1, param0.len()));
    params0.row_mut(0).assign(param0);

    if n_start > 0 {
        // Use a seed here for reproducibility: starting points just have
        // to be spread over [lower bound, upper bound]
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let unit = Array::random_using((n_start, param0.len()), Uniform::new(0., 1.), &mut rng);
        let lower = Array1::from_iter(bounds.iter().map(|b| b.0));
        let width = Array1::from_iter(bounds.iter().map(|b| b.1 - b.0));
        let seeds = unit * &width.insert_axis(Axis(0)) + &lower.insert_axis(Axis(0));
        Zip::from(params0.slice_mut(ndarray::s![1.., ..]).rows_mut())
            .and(seeds.rows())
            .for_each(|mut param, row| param.assign(&row));
    }
    params0
}

/// Minimize `objfn` starting from `param0` within `bounds` with cobyla.
/// Returns the best objective value found and the corresponding parameters.
/// A failed optimization returns an infinite objective value.
pub(crate) fn optimize_params<ObjF>(
    objfn: ObjF,
    param0: &Array1<f64>,
    bounds: &[(f64, f64)],
    cobyla: CobylaParams,
) -> (f64, Array1<f64>)
where
    ObjF: Fn(&[f64], Option<&mut [f64]>, &mut ()) -> f64,
{
    use cobyla::{minimize, Func, RhoBeg, StopTols};

    let cons: Vec<&dyn Func<()>> = vec![];
    let param0 = param0.to_vec();

    match minimize(
        |x, u| objfn(x, None, u),
        &param0,
        bounds,
        &cons,
        (),
        cobyla.maxeval,
        RhoBeg::All(cobyla.rhobeg),
        Some(StopTols {
            ftol_rel: cobyla.ftol_rel,
            ..StopTols::default()
        }),
    ) {
        Ok((_, x_opt, fval)) => {
            let fval = if f64::is_nan(fval) {
                f64::INFINITY
            } else {
                fval
            };
            (fval, Array1::from(x_opt))
        }
        Err((status, x_opt, _)) => {
            log::warn!("ERROR Cobyla optimizer in GPC status={status:?}");
            (f64::INFINITY, Array1::from(x_opt))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_prepare_multistart() {
        let param0 = array![0., 0.];
        let bounds = [(-3., 2.), (-1., 1.)];
        let starts = prepare_multistart(5, &param0, &bounds);
        assert_eq!((6, 2), starts.dim());
        assert_eq!(param0, starts.row(0));
        for row in starts.rows() {
            assert!(row[0] >= -3. && row[0] <= 2.);
            assert!(row[1] >= -1. && row[1] <= 1.);
        }
        // reproducible
        assert_eq!(starts, prepare_multistart(5, &param0, &bounds));

        let starts = prepare_multistart(0, &param0, &bounds);
        assert_eq!(array![[0., 0.]], starts);
    }

    #[test]
    fn test_optimize_params() {
        let objfn = |x: &[f64], _gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
            (x[0] - 0.5) * (x[0] - 0.5) + (x[1] + 0.25) * (x[1] + 0.25)
        };
        let (fmin, xopt) = optimize_params(
            objfn,
            &array![0., 0.],
            &[(-1., 1.), (-1., 1.)],
            CobylaParams {
                ftol_rel: 1e-10,
                ..CobylaParams::default()
            },
        );
        assert_abs_diff_eq!(array![0.5, -0.25], xopt, epsilon = 1e-3);
        assert_abs_diff_eq!(0., fmin, epsilon = 1e-6);
    }

    #[test]
    fn test_optimize_params_active_bound() {
        let objfn = |x: &[f64], _gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
            x[0] + x[1] * x[1]
        };
        let (_, xopt) = optimize_params(
            objfn,
            &array![0.5, 0.5],
            &[(-3., 2.), (-3., 2.)],
            CobylaParams::default(),
        );
        assert_abs_diff_eq!(array![-3., 0.], xopt, epsilon = 1e-2);
    }
}
