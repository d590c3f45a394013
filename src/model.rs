//! A model slot holding either GPC parameters waiting for training data
//! or a fitted [GaussianProcessClassifier].

use crate::algorithm::GaussianProcessClassifier;
use crate::errors::{GpcError, Result};
use crate::kernels::KernelParams;
use crate::parameters::{GpcParams, GpcValidParams};

use linfa::prelude::{DatasetBase, Fit, Float};
use linfa::ParamGuard;
use ndarray::{Array1, ArrayBase, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};

/// GPC model lifecycle: `Unfitted` until a successful [GpcModel::fit] call.
///
/// A failed fit leaves the model in its previous state. Fitting an already fitted model
/// trains a new classifier with the same parameters on the given dataset.
#[derive(Debug, Clone)]
#[cfg_attr(
    feature = "serializable",
    derive(Serialize, Deserialize),
    serde(bound(
        serialize = "F: Serialize",
        deserialize = "F: Deserialize<'de>"
    ))
)]
pub enum GpcModel<F: Float> {
    /// Parameters waiting for training data
    Unfitted(GpcValidParams<F>),
    /// Trained classifier
    Fitted(GaussianProcessClassifier<F>),
}

impl<F: Float> Default for GpcModel<F> {
    fn default() -> Self {
        GpcModel::Unfitted(GpcValidParams::default())
    }
}

impl<F: Float> GpcModel<F> {
    /// Create an unfitted model from checked parameters
    pub fn new(params: GpcParams<F>) -> Result<Self> {
        Ok(GpcModel::Unfitted(params.check()?))
    }

    /// Train the model on the given dataset and returns the fitted classifier
    pub fn fit<D: Data<Elem = F>>(
        &mut self,
        dataset: &DatasetBase<ArrayBase<D, Ix2>, ArrayBase<D, Ix1>>,
    ) -> Result<&GaussianProcessClassifier<F>> {
        let gpc = self.params().fit(dataset)?;
        *self = GpcModel::Fitted(gpc);
        self.classifier()
    }

    /// Parameters used (or to be used) for training
    pub fn params(&self) -> &GpcValidParams<F> {
        match self {
            GpcModel::Unfitted(params) => params,
            GpcModel::Fitted(gpc) => gpc.fit_params(),
        }
    }

    /// Whether the model is fitted
    pub fn is_fitted(&self) -> bool {
        matches!(self, GpcModel::Fitted(_))
    }

    /// The fitted classifier or [GpcError::NotFittedError]
    pub fn classifier(&self) -> Result<&GaussianProcessClassifier<F>> {
        match self {
            GpcModel::Fitted(gpc) => Ok(gpc),
            GpcModel::Unfitted(_) => Err(GpcError::NotFittedError),
        }
    }

    /// Fitted kernel hyperparameters if any
    pub fn theta(&self) -> Option<&KernelParams<F>> {
        self.classifier().ok().map(|gpc| gpc.theta())
    }

    /// Predict probabilities of class 1 at given `x` points,
    /// see [GaussianProcessClassifier::predict]
    pub fn predict(&self, x: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Result<Array1<F>> {
        self.classifier()?.predict(x)
    }

    /// Predict latent mean and variance at given `x` points,
    /// see [GaussianProcessClassifier::predict_params]
    pub fn predict_params(
        &self,
        x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    ) -> Result<(Array1<F>, Array1<F>)> {
        self.classifier()?.predict_params(x)
    }
}
