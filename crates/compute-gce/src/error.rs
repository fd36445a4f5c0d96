use halyard_compute::{ComputeError, ComputeErrorKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] halyard_metadata::Error),

    #[error("operation {name} failed: {code}: {message}")]
    OperationFailed {
        name: String,
        code: String,
        message: String,
    },

    #[error("operation {0} did not finish in time")]
    OperationTimeout(String),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Api(error.into())
    }
}

impl ComputeError for Error {
    fn kind(&self) -> ComputeErrorKind {
        match self {
            Self::Api(e) => match e.status() {
                Some(404) => ComputeErrorKind::NotFound,
                Some(409 | 429 | 500..=599) => ComputeErrorKind::NotReady,
                _ => ComputeErrorKind::External,
            },
            Self::OperationFailed { code, .. } if code == "RESOURCE_NOT_READY" => {
                ComputeErrorKind::NotReady
            }
            Self::OperationFailed { .. } => ComputeErrorKind::External,
            Self::OperationTimeout(_) => ComputeErrorKind::NotReady,
        }
    }
}
