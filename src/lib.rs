//! This library implements binary [Gaussian Process](https://en.wikipedia.org/wiki/Gaussian_process)
//! classification using the Laplace approximation of the latent posterior.
//!
//! A latent function with a gaussian process prior (squared exponential kernel) is squashed
//! through the logistic function to model the probability of class 1. Given labeled training
//! points, the posterior mode of the latent values is found with Newton iterations, kernel
//! hyperparameters are estimated by maximizing the Laplace approximation of the marginal likelihood,
//! and predictions give the latent mean and variance as well as class 1 probabilities.
//!
//! GPC is implemented by [GaussianProcessClassifier] parameterized by [GpcParams].
//! [GpcModel] wraps it in an explicit unfitted/fitted state for callers keeping a model slot.
//!
//! ```no_run
//! use egobox_gpc::{GaussianProcessClassifier, GpcModel};
//! use linfa::prelude::*;
//! use ndarray::array;
//!
//! let xt = array![[0., 0.], [0.5, 0.], [2., 2.], [2.5, 2.]];
//! let yt = array![0., 0., 1., 1.];
//!
//! let mut model = GpcModel::new(GaussianProcessClassifier::params().n_start(0))
//!     .expect("valid params");
//! model.fit(&Dataset::new(xt, yt)).expect("GPC fitted");
//!
//! let (mean, variance) = model.predict_params(&array![[1., 1.]]).expect("GPC prediction");
//! let probas = model.predict(&array![[1., 1.]]).expect("GPC prediction");
//! ```
#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]
mod algorithm;
mod errors;
pub mod kernels;
pub mod laplace;
mod model;
mod parameters;

mod optimization;
mod utils;

pub use algorithm::*;
pub use errors::*;
pub use kernels::{KernelParams, SquaredExponentialKernel};
pub use model::*;
pub use parameters::*;
pub use utils::{sigmoid, softplus};

/// Environment variable name used to set the log level in binaries using this library
pub const EGOBOX_LOG: &str = "EGOBOX_LOG";
