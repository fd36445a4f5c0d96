//! Error types for the mock compute implementation.

use halyard_compute::{ComputeError, ComputeErrorKind};
use thiserror::Error;

/// Error type for the mock compute implementation.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The instance, interface or rule does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Injected transient failure.
    #[error("resource not ready: {0}")]
    NotReady(String),

    /// Injected permanent rejection of a request.
    #[error("request rejected: {0}")]
    Rejected(String),

    /// Injected control plane outage.
    #[error("compute API unavailable")]
    Unavailable,
}

impl ComputeError for Error {
    fn kind(&self) -> ComputeErrorKind {
        match self {
            Self::NotFound(_) => ComputeErrorKind::NotFound,
            Self::NotReady(_) => ComputeErrorKind::NotReady,
            Self::Rejected(_) | Self::Unavailable => ComputeErrorKind::External,
        }
    }
}
