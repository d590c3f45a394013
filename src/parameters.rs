use crate::errors::{GpcError, Result};
use crate::kernels::{KernelParams, SquaredExponentialKernel};
use crate::{
    GPC_COBYLA_MAX_EVAL, GPC_COBYLA_MIN_EVAL, GPC_NEWTON_MAX_ITER, GPC_NEWTON_TOL,
    GPC_OPTIM_N_START,
};
use linfa::{Float, ParamGuard};

#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// An enum to represent the kernel hyperparameters tuning
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub enum ThetaTuning<F: Float> {
    /// Constant hyperparameters (ie given not estimated)
    Fixed(KernelParams<F>),
    /// Hyperparameters are optimized between given bounds starting from the initial guess
    Full {
        /// Initial guess for the hyperparameters
        init: KernelParams<F>,
        /// Bounds (lower, upper) for `[length_scale, signal_std]`
        bounds: [(F, F); 2],
    },
}

impl<F: Float> Default for ThetaTuning<F> {
    fn default() -> Self {
        let bounds = (
            F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.0),
            F::cast(ThetaTuning::<F>::DEFAULT_BOUNDS.1),
        );
        ThetaTuning::Full {
            init: KernelParams::new(
                F::cast(ThetaTuning::<F>::DEFAULT_INIT),
                F::cast(ThetaTuning::<F>::DEFAULT_INIT),
            ),
            bounds: [bounds, bounds],
        }
    }
}

impl<F: Float> ThetaTuning<F> {
    /// Default initial value for length scale and signal standard deviation
    pub const DEFAULT_INIT: f64 = 1.;
    /// Default bounds for length scale and signal standard deviation.
    ///
    /// On separable classes the likelihood drives the signal standard deviation up
    /// (until latent values saturate), the upper bound caps it.
    pub const DEFAULT_BOUNDS: (f64, f64) = (1e-3, 1e2);

    /// Get initial hyperparameters value
    pub fn init(&self) -> &KernelParams<F> {
        match self {
            ThetaTuning::Full { init, bounds: _ } => init,
            ThetaTuning::Fixed(init) => init,
        }
    }

    /// Get bounds for hyperparameters values
    pub fn bounds(&self) -> Option<&[(F, F); 2]> {
        match self {
            ThetaTuning::Full { init: _, bounds } => Some(bounds),
            ThetaTuning::Fixed(_) => None,
        }
    }
}

/// A set of validated GPC parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize",
        deserialize = "F: Deserialize<'de>"
    ))
)]
pub struct GpcValidParams<F: Float> {
    /// Hyperparameters tuning of the kernel
    pub(crate) theta_tuning: ThetaTuning<F>,
    /// Covariance kernel of the latent process
    pub(crate) kernel: SquaredExponentialKernel,
    /// Jitter added to the diagonal of the gram matrix
    pub(crate) nugget: F,
    /// Max number of Newton iterations to find the latent posterior mode
    pub(crate) max_iter: usize,
    /// Convergence tolerance of Newton iterations
    pub(crate) tol: F,
    /// Number of internal likelihood optimization restart
    pub(crate) n_start: usize,
    /// Max number of internal likelihood evaluation during optimization
    pub(crate) max_eval: usize,
}

impl<F: Float> Default for GpcValidParams<F> {
    fn default() -> GpcValidParams<F> {
        GpcValidParams {
            theta_tuning: ThetaTuning::default(),
            kernel: SquaredExponentialKernel::default(),
            nugget: F::cast(1e-6),
            max_iter: GPC_NEWTON_MAX_ITER,
            tol: F::cast(GPC_NEWTON_TOL),
            n_start: GPC_OPTIM_N_START,
            max_eval: GPC_COBYLA_MAX_EVAL,
        }
    }
}

impl<F: Float> GpcValidParams<F> {
    /// Get hyperparameters tuning
    pub fn theta_tuning(&self) -> &ThetaTuning<F> {
        &self.theta_tuning
    }

    /// Get covariance kernel k(x, x')
    pub fn kernel(&self) -> &SquaredExponentialKernel {
        &self.kernel
    }

    /// Get jitter added to the gram matrix diagonal
    pub fn nugget(&self) -> F {
        self.nugget
    }

    /// Get max number of Newton iterations
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }

    /// Get Newton convergence tolerance
    pub fn tol(&self) -> F {
        self.tol
    }

    /// Get the number of internal optimization restart
    pub fn n_start(&self) -> usize {
        self.n_start
    }

    /// Get the max number of internal likelihood evaluations during one optimization
    pub fn max_eval(&self) -> usize {
        self.max_eval
    }
}

#[derive(Clone, Debug)]
/// The set of hyperparameters that can be specified for the execution of
/// the [GPC algorithm](crate::GaussianProcessClassifier).
pub struct GpcParams<F: Float>(GpcValidParams<F>);

impl<F: Float> Default for GpcParams<F> {
    fn default() -> Self {
        GpcParams(GpcValidParams::default())
    }
}

impl<F: Float> GpcParams<F> {
    /// A constructor for GPC parameters with default settings
    pub fn new() -> GpcParams<F> {
        Self::default()
    }

    /// A constructor for GPC parameters from validated parameters
    pub fn new_from_valid(params: &GpcValidParams<F>) -> Self {
        Self(params.clone())
    }

    /// Set initial value for hyperparameters.
    ///
    /// When theta is optimized, the internal optimization is started from `theta_init`.
    /// When theta is fixed, this set theta constant value.
    pub fn theta_init(mut self, theta_init: KernelParams<F>) -> Self {
        self.0.theta_tuning = match self.0.theta_tuning {
            ThetaTuning::Full { init: _, bounds } => ThetaTuning::Full {
                init: theta_init,
                bounds,
            },
            ThetaTuning::Fixed(_) => ThetaTuning::Fixed(theta_init),
        };
        self
    }

    /// Set hyperparameters search space as (lower, upper) bounds for
    /// `[length_scale, signal_std]`.
    ///
    /// Lower bounds should be strictly positive. The search space is finite, default upper bounds
    /// being [ThetaTuning::DEFAULT_BOUNDS]. With separable classes the fitted signal standard
    /// deviation grows with the upper bound and predicted probabilities get closer to 0.5
    /// away from the training points, hence a lower upper bound gives sharper probabilities.
    ///
    /// This function is no-op when theta tuning is fixed
    pub fn theta_bounds(mut self, theta_bounds: [(F, F); 2]) -> Self {
        self.0.theta_tuning = match self.0.theta_tuning {
            ThetaTuning::Full { init, bounds: _ } => ThetaTuning::Full {
                init,
                bounds: theta_bounds,
            },
            ThetaTuning::Fixed(f) => ThetaTuning::Fixed(f),
        };
        self
    }

    /// Set hyperparameters tuning
    pub fn theta_tuning(mut self, theta_tuning: ThetaTuning<F>) -> Self {
        self.0.theta_tuning = theta_tuning;
        self
    }

    /// Set nugget.
    ///
    /// Nugget is used to improve numerical stability
    pub fn nugget(mut self, nugget: F) -> Self {
        self.0.nugget = nugget;
        self
    }

    /// Set the max number of Newton iterations used to find the latent posterior mode
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.0.max_iter = max_iter;
        self
    }

    /// Set the convergence tolerance of Newton iterations
    pub fn tol(mut self, tol: F) -> Self {
        self.0.tol = tol;
        self
    }

    /// Set the number of internal hyperparameters optimization restarts
    pub fn n_start(mut self, n_start: usize) -> Self {
        self.0.n_start = n_start;
        self
    }

    /// Set the max number of internal likelihood evaluations during one optimization
    /// Given max_eval has to be greater than [crate::GPC_COBYLA_MIN_EVAL] otherwise
    /// max_eval is set to [crate::GPC_COBYLA_MIN_EVAL].
    pub fn max_eval(mut self, max_eval: usize) -> Self {
        self.0.max_eval = GPC_COBYLA_MIN_EVAL.max(max_eval);
        self
    }
}

impl<F: Float> From<GpcValidParams<F>> for GpcParams<F> {
    fn from(valid: GpcValidParams<F>) -> Self {
        GpcParams(valid)
    }
}

impl<F: Float> ParamGuard for GpcParams<F> {
    type Checked = GpcValidParams<F>;
    type Error = GpcError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let params = &self.0;
        if !(params.nugget >= F::zero() && params.nugget.is_finite()) {
            return Err(GpcError::InvalidValueError(format!(
                "`nugget` should be finite positive or null, got {}",
                params.nugget
            )));
        }
        if !(params.tol > F::zero()) {
            return Err(GpcError::InvalidValueError(format!(
                "`tol` should be strictly positive, got {}",
                params.tol
            )));
        }
        let init = params.theta_tuning.init();
        if !(init.length_scale > F::zero() && init.signal_std >= F::zero()) {
            return Err(GpcError::InvalidValueError(format!(
                "theta should have length_scale > 0 and signal_std >= 0, got {init}"
            )));
        }
        if let Some(bounds) = params.theta_tuning.bounds() {
            for (lo, up) in bounds.iter() {
                if !(*lo > F::zero() && lo <= up) {
                    return Err(GpcError::InvalidValueError(format!(
                        "theta bounds should satisfy 0 < lower <= upper, got ({lo}, {up})"
                    )));
                }
            }
            let values = [init.length_scale, init.signal_std];
            if values
                .iter()
                .zip(bounds.iter())
                .any(|(v, (lo, up))| v < lo || v > up)
            {
                return Err(GpcError::InvalidValueError(format!(
                    "theta initial guess {init} should be within bounds {bounds:?}"
                )));
            }
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}
