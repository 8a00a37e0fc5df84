//! Error types.

use thiserror::Error;

/// Input problems that block a run from starting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Computer name is empty or whitespace
    #[error("computer name is required")]
    MissingComputerName,

    /// No candidate targets to sample from
    #[error("target pool is empty")]
    EmptyTargetPool,
}

/// Failure of a single probe round-trip.
#[derive(Error, Debug)]
pub enum ProbeError {
    /// HTTP/network error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("endpoint returned status {0}")]
    Status(u16),
}
