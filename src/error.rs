use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Every error comes from a validation pass that runs before any heavy computation, never
/// together with a partial result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed graph: negative or non-finite capacity, node index out of range, empty graph.
    #[error("invalid graph: {0}")]
    InvalidGraph(String),

    /// Malformed CRF model: label count, dimensionality mismatch, non-positive bandwidth, ...
    #[error("invalid model: {0}")]
    InvalidModel(String),

    /// Capacity or cost sums that do not fit into the accumulator type.
    #[error("numeric overflow: {0}")]
    NumericOverflow(String),

    /// Container built from a slice of the wrong length.
    #[error("dimension mismatch: expected {expected} elements, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
}

impl Error {
    pub(crate) fn graph(msg: impl Into<String>) -> Self {
        Error::InvalidGraph(msg.into())
    }

    pub(crate) fn model(msg: impl Into<String>) -> Self {
        Error::InvalidModel(msg.into())
    }

    pub(crate) fn overflow(msg: impl Into<String>) -> Self {
        Error::NumericOverflow(msg.into())
    }
}
