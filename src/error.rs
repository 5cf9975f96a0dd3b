//! Error types for techno-economic analysis.
use thiserror::Error;

/// Errors raised by the TEA engine and its collaborators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TeaError {
    /// The venture or a collaborator was configured with invalid options
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// An argument passed to an operation is not acceptable
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A numerical routine hit a singularity or failed to converge
    #[error("numerical failure: {reason}")]
    NumericalFailure {
        /// What went wrong
        reason: String,
    },
}

impl TeaError {
    /// Create a new [`TeaError::NumericalFailure`]
    pub fn numerical(reason: impl Into<String>) -> Self {
        Self::NumericalFailure {
            reason: reason.into(),
        }
    }

    /// Whether the error is a (possibly recoverable) numerical failure
    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::NumericalFailure { .. })
    }
}

/// Result type for TEA operations
pub type TeaResult<T> = Result<T, TeaError>;
