use halyard_failover::ApplianceError;
use thiserror::Error;

/// Errors talking to the device's REST API.
#[derive(Debug, Error)]
pub enum Error {
    /// The request could not be sent or the body not decoded.
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// No device in the trust domain is marked as the local one.
    #[error("device list has no self device")]
    NoSelfDevice,

    /// The device answered with a non-success status.
    #[error("GET {path} returned {status}: {body}")]
    Status {
        /// Request path.
        path: String,

        /// HTTP status.
        status: u16,

        /// Response body.
        body: String,
    },
}

impl ApplianceError for Error {}
