use thiserror::Error;

/// Error types for the relaxfit library.
#[derive(Error, Debug)]
pub enum RelaxError {
    /// Error indicating a mismatch in vector or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error for invalid parameter values.
    #[error("Invalid parameter value: {0}")]
    InvalidParameter(String),

    /// Curve grouping metadata that cannot be encoded into a parameter map.
    #[error("Malformed grouping: {0}")]
    MalformedGrouping(String),

    /// No initial estimate could be derived from the data.
    #[error("Guess unavailable for {equation}: {reason}")]
    GuessUnavailable { equation: String, reason: String },

    /// Error for boundary constraint violations.
    #[error("Bounds error: {0}")]
    BoundsError(String),

    /// Error indicating optimization failed.
    #[error("Optimization failed: {0}")]
    OptimizationFailure(String),

    /// Error during function evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// Linear algebra error.
    #[error("Linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// An equation name that is not in the catalogue.
    #[error("Unknown equation: {0}")]
    UnknownEquation(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl From<crate::parameters::bounds::BoundsError> for RelaxError {
    fn from(err: crate::parameters::bounds::BoundsError) -> Self {
        RelaxError::BoundsError(err.to_string())
    }
}

/// Result type alias for relaxfit operations.
pub type Result<T> = std::result::Result<T, RelaxError>;
