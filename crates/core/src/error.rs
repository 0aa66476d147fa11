//! Error types for Runnel

use thiserror::Error;

/// Main error type for Runnel operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid topology: routing graph contains a cycle through node {node}")]
    InvalidTopology { node: usize },

    #[error("Invalid fractions at node {node}: outgoing fractions sum to {sum}, expected 1")]
    InvalidFractions { node: usize, sum: f64 },

    /// `node` is `None` when a uniform rate was rejected
    #[error("Negative runoff rate {rate}{}", runoff_location(.node))]
    NegativeRunoff { node: Option<usize>, rate: f64 },

    #[error("Unknown node {node} in graph of {nodes} nodes")]
    UnknownNode { node: usize, nodes: usize },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Size mismatch: expected {expected} values, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for [`Error::InvalidParameter`]
    pub fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

fn runoff_location(node: &Option<usize>) -> String {
    match node {
        Some(node) => format!(" at node {}", node),
        None => " applied uniformly".to_string(),
    }
}

/// Result type alias for Runnel operations
pub type Result<T> = std::result::Result<T, Error>;
