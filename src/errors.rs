use thiserror::Error;

/// A result type for GP classification algorithm
pub type Result<T> = std::result::Result<T, GpcError>;

/// An error when using a [`GaussianProcessClassifier`](crate::GaussianProcessClassifier)
/// or a [`GpcModel`](crate::GpcModel)
#[derive(Error, Debug)]
pub enum GpcError {
    /// When a prediction is requested on a model which is not fitted yet
    #[error("Model not fitted: call fit() before predicting")]
    NotFittedError,
    /// When likelihood computation fails
    #[error("Likelihood computation error: {0}")]
    LikelihoodComputationError(String),
    /// When linear algebra computation fails
    #[error(transparent)]
    LinalgError(#[from] linfa_linalg::LinalgError),
    /// When a linfa error occurs
    #[error(transparent)]
    LinfaError(#[from] linfa::error::Error),
    /// When error due to a bad value
    #[error("InvalidValue error: {0}")]
    InvalidValueError(String),
}
