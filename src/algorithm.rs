use crate::errors::{GpcError, Result};
use crate::kernels::KernelParams;
use crate::laplace::{laplace_likelihood, LaplaceApprox};
use crate::optimization::{optimize_params, prepare_multistart, CobylaParams};
use crate::parameters::{GpcParams, GpcValidParams, ThetaTuning};
use crate::utils::{pairwise_sq_distances, sigmoid};

use linfa::prelude::{DatasetBase, Fit, Float, PredictInplace};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix1, Ix2, Zip};
use ndarray_stats::QuantileExt;

use log::{debug, info, warn};
use rayon::prelude::*;
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Default number of multistart for hyperparameters optimization
pub const GPC_OPTIM_N_START: usize = 2;
/// Minimum of function evaluations for COBYLA optimizer
pub const GPC_COBYLA_MIN_EVAL: usize = 25;
/// Maximum of function evaluations for COBYLA optimizer
pub const GPC_COBYLA_MAX_EVAL: usize = 200;
/// Default max number of Newton iterations for the latent posterior mode
pub const GPC_NEWTON_MAX_ITER: usize = 10;
/// Default convergence tolerance of Newton iterations
pub const GPC_NEWTON_TOL: f64 = 1e-9;

/// A binary Gaussian Process Classifier using the Laplace approximation
///
/// A latent gaussian process `a(x)` with a squared exponential covariance kernel
/// is squashed through the logistic function to give the probability of class 1:
/// `p(y=1|x) = sigmoid(a(x))`.
///
/// As the logistic likelihood makes the latent posterior non gaussian,
/// it is approximated by a gaussian centered at its mode (Laplace approximation).
/// Kernel hyperparameters (length scale and signal standard deviation) are estimated
/// by maximizing the Laplace approximation of the marginal likelihood.
///
/// Predicted probabilities are obtained from the latent predictive mean `mu` and
/// variance `var` using the probit approximation of the logistic-gaussian integral:
///
/// `p(y=1|x) ~ sigmoid(mu / sqrt(1 + pi * var / 8))`
///
/// # Example
///
/// ```no_run
/// use egobox_gpc::GaussianProcessClassifier;
/// use linfa::prelude::*;
/// use ndarray::array;
///
/// let xt = array![[-2.], [-1.5], [-1.], [1.], [1.5], [2.]];
/// let yt = array![0., 0., 0., 1., 1., 1.];
///
/// let gpc = GaussianProcessClassifier::<f64>::params()
///     .fit(&Dataset::new(xt, yt))
///     .expect("GPC fitted");
///
/// let xtest = array![[-1.8], [0.], [1.8]];
/// let probas = gpc.predict(&xtest).expect("GPC prediction");
/// ```
///
/// # Reference
///
/// Rasmussen, C. E. & Williams, C. K. I. (2006).
/// [Gaussian Processes for Machine Learning](http://gaussianprocess.org/gpml/chapters/RW3.pdf),
/// chapter 3, Classification. MIT Press.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize",
        deserialize = "F: Deserialize<'de>"
    ))
)]
pub struct GaussianProcessClassifier<F: Float> {
    /// Kernel hyperparameters
    theta: KernelParams<F>,
    /// Laplace approximation of the log marginal likelihood at theta
    likelihood: F,
    /// Training dataset (input, labels)
    pub(crate) training_data: (Array2<F>, Array1<F>),
    /// Parameters used to fit this model
    pub(crate) params: GpcValidParams<F>,
}

impl<F: Float> fmt::Display for GaussianProcessClassifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "GPC(kernel={}, theta={}, likelihood={})",
            self.params.kernel, self.theta, self.likelihood,
        )
    }
}

impl<F: Float> GaussianProcessClassifier<F> {
    /// Gpc parameters constructor
    pub fn params() -> GpcParams<F> {
        GpcParams::new()
    }

    /// Predict probabilities of class 1 at n given `x` points of nx components
    /// specified as a (n, nx) matrix.
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        let (mean, variance) = self.predict_params(x)?;
        let pi_8 = F::cast(std::f64::consts::PI / 8.);
        Ok(Zip::from(&mean)
            .and(&variance)
            .map_collect(|&mu, &var| sigmoid(mu / (F::one() + pi_8 * var).sqrt())))
    }

    /// Predict mean and variance of the latent function at n given `x` points
    /// of nx components specified as a (n, nx) matrix.
    /// Returns a tuple of two (n,) vectors (mean, variance).
    pub fn predict_params(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        let (xt, yt) = &self.training_data;
        if x.ncols() != xt.ncols() {
            return Err(GpcError::InvalidValueError(format!(
                "Input dimension mismatch: expected {} components, got {}",
                xt.ncols(),
                x.ncols()
            )));
        }
        let kernel = self.params.kernel();
        let nugget = self.params.nugget();

        let k = kernel.gram(xt, &self.theta, nugget);
        let k_s = kernel.value(xt, x, &self.theta);
        let approx = LaplaceApprox::new(&k, yt, self.params.max_iter(), self.params.tol())?;

        let mean = k_s.t().dot(&approx.residuals(yt));
        let reduction = approx.variance_reduction(&k_s)?;
        let variance = (kernel.diag(x.nrows(), &self.theta, nugget) - reduction)
            .mapv(|v| if v < F::zero() { F::zero() } else { v });
        Ok((mean, variance))
    }

    /// Retrieve kernel hyperparameters
    pub fn theta(&self) -> &KernelParams<F> {
        &self.theta
    }

    /// Retrieve Laplace approximation of the log marginal likelihood
    pub fn likelihood(&self) -> F {
        self.likelihood
    }

    /// Retrieve input and output dimensions
    pub fn dims(&self) -> (usize, usize) {
        (self.training_data.0.ncols(), 1)
    }

    /// Retrieve training data (inputs, labels)
    pub fn training_data(&self) -> &(Array2<F>, Array1<F>) {
        &self.training_data
    }

    /// Retrieve parameters used to fit this model
    pub fn fit_params(&self) -> &GpcValidParams<F> {
        &self.params
    }
}

impl<F, D> PredictInplace<ArrayBase<D, Ix2>, Array1<F>> for GaussianProcessClassifier<F>
where
    F: Float,
    D: Data<Elem = F>,
{
    fn predict_inplace(&self, x: &ArrayBase<D, Ix2>, y: &mut Array1<F>) {
        assert_eq!(
            x.nrows(),
            y.len(),
            "The number of data points must match the number of output targets."
        );

        let values = self.predict(x).expect("GPC Prediction");
        *y = values;
    }

    fn default_target(&self, x: &ArrayBase<D, Ix2>) -> Array1<F> {
        Array1::zeros((x.nrows(),))
    }
}

/// Check training inputs and labels consistency
fn check_training_data<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> Result<()> {
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(GpcError::InvalidValueError(format!(
            "Training inputs should not be empty, got shape {:?}",
            x.dim()
        )));
    }
    if x.nrows() != y.len() {
        return Err(GpcError::InvalidValueError(format!(
            "Training inputs and labels should have the same length, got {} and {}",
            x.nrows(),
            y.len()
        )));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(GpcError::InvalidValueError(
            "Training inputs should be finite".to_string(),
        ));
    }
    if let Some(label) = y.iter().find(|&&v| v != F::zero() && v != F::one()) {
        return Err(GpcError::InvalidValueError(format!(
            "Training labels should be 0. or 1., got {label}"
        )));
    }
    Ok(())
}

/// Objective of the hyperparameters optimization: the negative Laplace log likelihood
/// of the training data given kernel hyperparameters `theta`.
/// NaN hyperparameters or a likelihood computation failure give `+inf`.
fn neg_log_likelihood<F: Float>(
    theta: &KernelParams<F>,
    xtrain: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ytrain: &ArrayBase<impl Data<Elem = F>, Ix1>,
    params: &GpcValidParams<F>,
) -> f64 {
    // check theta as optimizer may return nan values
    if theta.has_nan() {
        return f64::INFINITY;
    }
    let k = params.kernel().gram(xtrain, theta, params.nugget());
    likelihood_objective(&k, ytrain, params.max_iter(), params.tol())
}

/// Negative Laplace log likelihood given the gram matrix `k` as a finite `f64`, `+inf` otherwise
fn likelihood_objective<F: Float>(
    k: &ArrayBase<impl Data<Elem = F>, Ix2>,
    y: &ArrayBase<impl Data<Elem = F>, Ix1>,
    max_iter: usize,
    tol: F,
) -> f64 {
    match laplace_likelihood(k, y, max_iter, tol) {
        Ok(lkh) => match (-lkh).to_f64() {
            Some(v) if v.is_finite() => v,
            _ => f64::INFINITY,
        },
        Err(_) => f64::INFINITY,
    }
}

impl<F: Float, D: Data<Elem = F>> Fit<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>, GpcError>
    for GpcValidParams<F>
{
    type Object = GaussianProcessClassifier<F>;

    /// Fit GPC kernel hyperparameters by maximizing the Laplace approximation
    /// of the marginal likelihood
    fn fit(
        &self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<Self::Object> {
        let xtrain = dataset.records().to_owned();
        let ytrain = dataset.targets().to_owned();
        check_training_data(&xtrain, &ytrain)?;

        let mut distances = pairwise_sq_distances(&xtrain, &xtrain);
        distances.diag_mut().fill(F::infinity());
        if let Ok(&dmin) = distances.min() {
            if dmin == F::zero() {
                warn!("Multiple training points have the same input value (at least same row twice).");
            }
        }

        let kernel = self.kernel();
        let theta = match self.theta_tuning() {
            ThetaTuning::Fixed(init) => {
                // Easy path no optimization
                *init
            }
            ThetaTuning::Full { init, bounds } => {
                let objfn = |x: &[f64], _gradient: Option<&mut [f64]>, _params: &mut ()| -> f64 {
                    neg_log_likelihood(&KernelParams::from_log10(x), &xtrain, &ytrain, self)
                };

                let log10 = |v: F| v.log10().to_f64().unwrap_or(f64::NAN);
                let theta0 = init.to_array().mapv(log10);
                let bounds = bounds
                    .iter()
                    .map(|&(lo, up)| (log10(lo), log10(up)))
                    .collect::<Vec<_>>();
                let theta_inits = prepare_multistart(self.n_start(), &theta0, &bounds);
                debug!("Optimize with multistart log10(theta) = {theta_inits:?} and bounds = {bounds:?}");
                let now = Instant::now();
                let opt_params = (0..theta_inits.nrows())
                    .into_par_iter()
                    .map(|i| {
                        optimize_params(
                            objfn,
                            &theta_inits.row(i).to_owned(),
                            &bounds,
                            CobylaParams {
                                maxeval: self.max_eval(),
                                ..CobylaParams::default()
                            },
                        )
                    })
                    .reduce(
                        || (f64::INFINITY, Array1::zeros((theta_inits.ncols(),))),
                        |a, b| if b.0 < a.0 { b } else { a },
                    );
                debug!("elapsed optim = {:?}", now.elapsed().as_millis());
                if !opt_params.0.is_finite() {
                    return Err(GpcError::LikelihoodComputationError(format!(
                        "No finite likelihood found within bounds {bounds:?} (log10 scale)"
                    )));
                }
                KernelParams::from_log10(&opt_params.1.to_vec())
            }
        };

        let k = kernel.gram(&xtrain, &theta, self.nugget());
        let likelihood = laplace_likelihood(&k, &ytrain, self.max_iter(), self.tol())?;
        info!(
            "GPC fitted theta = {theta}, negative log likelihood = {}",
            -likelihood
        );
        Ok(GaussianProcessClassifier {
            theta,
            likelihood,
            training_data: (xtrain, ytrain),
            params: self.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use linfa::prelude::{Dataset, Predict};
    use linfa::ParamGuard;
    use ndarray::{array, concatenate, Array, Axis};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Normal;
    use ndarray_rand::RandomExt;
    use paste::paste;
    use rand_xoshiro::Xoshiro256Plus;

    fn two_clusters(n: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(seed);
        let noise = Normal::new(0., 0.5).unwrap();
        let x0 = Array2::random_using((n, 2), noise, &mut rng) - 1.5;
        let x1 = Array2::random_using((n, 2), noise, &mut rng) + 1.5;
        let x = concatenate![Axis(0), x0, x1];
        let y = concatenate![Axis(0), Array1::<f64>::zeros(n), Array1::<f64>::ones(n)];
        (x, y)
    }

    /// Two disks of radius 1 with `n` points each laid out along a sunflower spiral,
    /// centered on (-1.5, -1.5) labeled 0 and (1.5, 1.5) labeled 1
    fn sunflower_clusters(n: usize) -> (Array2<f64>, Array1<f64>) {
        let golden_angle = std::f64::consts::PI * (3. - 5f64.sqrt());
        let disk = Array2::from_shape_fn((n, 2), |(i, j)| {
            let r = ((i as f64 + 0.5) / n as f64).sqrt();
            let angle = i as f64 * golden_angle;
            if j == 0 {
                r * angle.cos()
            } else {
                r * angle.sin()
            }
        });
        let x = concatenate![Axis(0), &disk - 1.5, &disk + 1.5];
        let y = concatenate![Axis(0), Array1::<f64>::zeros(n), Array1::<f64>::ones(n)];
        (x, y)
    }

    fn training_accuracy(gpc: &GaussianProcessClassifier<f64>) -> f64 {
        let (x, y) = gpc.training_data();
        let probas = gpc.predict(x).expect("GPC prediction");
        let n_ok = Zip::from(&probas)
            .and(y)
            .fold(0, |acc, &p, &yi| acc + ((p > 0.5) == (yi > 0.5)) as usize);
        n_ok as f64 / y.len() as f64
    }

    #[test]
    fn test_two_clusters() {
        let (x, y) = sunflower_clusters(50);
        let ds = Dataset::new(x, y);
        let centroids = array![[1.5, 1.5], [-1.5, -1.5]];

        // With separable classes the likelihood keeps growing with the signal std
        // up to ~25 where latent values at training points saturate: predictive variance
        // stays close to the prior one and the probit correction pulls centroid
        // probabilities down to ~0.85.
        let gpc = GaussianProcessClassifier::params()
            .n_start(0)
            .max_eval(50)
            .fit(&ds)
            .expect("GPC fitted");
        println!("{gpc}");
        let probas = gpc.predict(&centroids).expect("GPC prediction");
        assert!(probas[0] > 0.5, "class 1 centroid proba {}", probas[0]);
        assert!(probas[1] < 0.5, "class 0 centroid proba {}", probas[1]);
        assert!(training_accuracy(&gpc) >= 0.95);
        assert_eq!((2, 1), gpc.dims());
        assert!(gpc.likelihood() < 0.);
        let bounds = ThetaTuning::<f64>::DEFAULT_BOUNDS;
        for &v in gpc.theta().to_array().iter() {
            assert!(v >= bounds.0 * (1. - 1e-6) && v <= bounds.1 * (1. + 1e-6));
        }

        // Bounding the signal std keeps the predictive variance small at the centroids
        let capped = GaussianProcessClassifier::params()
            .theta_bounds([(1e-3, 1e2), (1e-3, 5.)])
            .n_start(0)
            .max_eval(50)
            .fit(&ds)
            .expect("GPC fitted");
        println!("{capped}");
        assert!(capped.theta().signal_std <= 5. * (1. + 1e-6));
        let probas = capped.predict(&centroids).expect("GPC prediction");
        assert!(probas[0] > 0.9, "class 1 centroid proba {}", probas[0]);
        assert!(probas[1] < 0.1, "class 0 centroid proba {}", probas[1]);
        assert!(training_accuracy(&capped) >= 0.95);

        // the larger search space reaches a better likelihood
        assert!(gpc.likelihood() > capped.likelihood());
    }

    #[test]
    fn test_neg_log_likelihood() {
        let (x, y) = two_clusters(5, 0);
        let params = GaussianProcessClassifier::<f64>::params()
            .check()
            .expect("valid params");
        let theta = KernelParams::new(1., 2.);

        let k = params.kernel().gram(&x, &theta, params.nugget());
        let lkh = laplace_likelihood(&k, &y, params.max_iter(), params.tol()).expect("likelihood");
        assert_abs_diff_eq!(
            -lkh,
            neg_log_likelihood(&theta, &x, &y, &params),
            epsilon = 1e-12
        );

        // optimizer may give nan values
        let theta = KernelParams::from_log10(&[f64::NAN, 0.]);
        assert_eq!(f64::INFINITY, neg_log_likelihood(&theta, &x, &y, &params));

        // gram matrix not positive definite
        let k = array![[1., 2.], [2., 1.]];
        assert_eq!(
            f64::INFINITY,
            likelihood_objective(&k, &array![0., 1.], 10, 1e-9)
        );
    }

    #[test]
    fn test_single_point() {
        let x = array![[0.3, -0.7]];
        let y = array![1.];
        let gpc = GaussianProcessClassifier::params()
            .n_start(0)
            .fit(&Dataset::new(x.to_owned(), y))
            .expect("GPC fitted");
        let probas = gpc.predict(&x).expect("GPC prediction");
        assert!(probas[0] > 0.5);
    }

    #[test]
    fn test_symmetric_dataset() {
        let x = array![[-1., 0.], [-1., 1.], [-2., -0.5], [1., 0.], [1., -1.], [2., 0.5]];
        let y = array![0., 0., 0., 1., 1., 1.];
        let gpc = GaussianProcessClassifier::params()
            .n_start(0)
            .fit(&Dataset::new(x, y))
            .expect("GPC fitted");
        let probas = gpc.predict(&array![[0., 0.]]).expect("GPC prediction");
        assert_abs_diff_eq!(0.5, probas[0], epsilon = 0.05);
    }

    #[test]
    fn test_predict_consistency() {
        let (x, y) = two_clusters(10, 0);
        let theta = KernelParams::new(1.5, 2.);
        let gpc = GaussianProcessClassifier::params()
            .theta_tuning(ThetaTuning::Fixed(theta))
            .fit(&Dataset::new(x, y))
            .expect("GPC fitted");
        assert_eq!(&theta, gpc.theta());

        let mut rng = Xoshiro256Plus::seed_from_u64(1);
        let xtest = Array::random_using((30, 2), Normal::new(0., 2.).unwrap(), &mut rng);
        let (mean, var) = gpc.predict_params(&xtest).expect("GPC params prediction");
        assert!(var.iter().all(|&v| v >= 0.));

        let expected = Zip::from(&mean)
            .and(&var)
            .map_collect(|&mu, &v| sigmoid(mu / (1. + std::f64::consts::PI * v / 8.).sqrt()));
        let probas = gpc.predict(&xtest).expect("GPC prediction");
        assert_abs_diff_eq!(expected, probas, epsilon = 1e-12);
        assert!(probas.iter().all(|&p| p > 0. && p < 1.));

        // linfa predict
        let probas_linfa: Array1<f64> = Predict::predict(&gpc, &xtest);
        assert_abs_diff_eq!(probas, probas_linfa, epsilon = 1e-12);
    }

    #[test]
    fn test_variance_far_from_data() {
        let (x, y) = two_clusters(10, 3);
        let theta = KernelParams::new(1., 2.);
        let gpc = GaussianProcessClassifier::params()
            .theta_tuning(ThetaTuning::Fixed(theta))
            .fit(&Dataset::new(x, y))
            .expect("GPC fitted");
        let (mean, var) = gpc
            .predict_params(&array![[50., -50.]])
            .expect("GPC params prediction");
        // prior is recovered far from training points
        assert_abs_diff_eq!(0., mean[0], epsilon = 1e-10);
        assert_abs_diff_eq!(4. + gpc.fit_params().nugget(), var[0], epsilon = 1e-10);
    }

    #[test]
    fn test_duplicated_points() {
        let x = array![[0., 0.], [0., 0.], [1., 1.], [2., 2.]];
        let y = array![0., 0., 1., 1.];
        let gpc = GaussianProcessClassifier::params()
            .theta_tuning(ThetaTuning::Fixed(KernelParams::new(1., 1.)))
            .fit(&Dataset::new(x, y))
            .expect("GPC fitted");
        let probas = gpc.predict(&array![[0., 0.], [2., 2.]]).expect("GPC prediction");
        assert!(probas[0] < 0.5);
        assert!(probas[1] > 0.5);
    }

    macro_rules! test_invalid_training_data {
        ($name:ident, $x:expr, $y:expr) => {
            paste! {
                #[test]
                fn [<test_invalid_ $name>]() {
                    let res = GaussianProcessClassifier::<f64>::params()
                        .check()
                        .expect("valid params")
                        .fit(&Dataset::new($x, $y));
                    assert!(matches!(res, Err(GpcError::InvalidValueError(_))));
                }
            }
        };
    }

    test_invalid_training_data!(labels, array![[0.], [1.]], array![0., 2.]);
    test_invalid_training_data!(empty, Array2::<f64>::zeros((0, 2)), Array1::<f64>::zeros(0));
    test_invalid_training_data!(nan_input, array![[0.], [f64::NAN]], array![0., 1.]);

    #[test]
    fn test_dimension_mismatch() {
        let (x, y) = two_clusters(5, 0);
        let gpc = GaussianProcessClassifier::params()
            .theta_tuning(ThetaTuning::Fixed(KernelParams::default()))
            .fit(&Dataset::new(x, y))
            .expect("GPC fitted");
        let res = gpc.predict(&array![[0., 0., 0.]]);
        assert!(matches!(res, Err(GpcError::InvalidValueError(_))));
    }

    #[test]
    fn test_fit_f32() {
        let (x, y) = two_clusters(10, 5);
        let gpc = GaussianProcessClassifier::<f32>::params()
            .theta_tuning(ThetaTuning::Fixed(KernelParams::new(1., 1.)))
            .fit(&Dataset::new(x.mapv(|v| v as f32), y.mapv(|v| v as f32)))
            .expect("GPC fitted");
        let probas = gpc
            .predict(&array![[1.5f32, 1.5], [-1.5, -1.5]])
            .expect("GPC prediction");
        assert!(probas[0] > 0.5);
        assert!(probas[1] < 0.5);
    }

    #[cfg(feature = "serializable")]
    #[test]
    fn test_serde_gpc() {
        let (x, y) = two_clusters(5, 0);
        let gpc = GaussianProcessClassifier::params()
            .theta_tuning(ThetaTuning::Fixed(KernelParams::new(0.8, 1.2)))
            .fit(&Dataset::new(x, y))
            .expect("GPC fitted");
        let json = serde_json::to_string(&gpc).expect("serialized");
        let loaded: GaussianProcessClassifier<f64> =
            serde_json::from_str(&json).expect("deserialized");
        assert_eq!(gpc.theta(), loaded.theta());
        let xtest = array![[0.5, 0.5], [-1., 2.]];
        assert_abs_diff_eq!(
            gpc.predict(&xtest).expect("GPC prediction"),
            loaded.predict(&xtest).expect("GPC prediction"),
            epsilon = 1e-12
        );
    }
}
