use halyard_messaging::{PubSubError, PubSubErrorKind};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] halyard_metadata::Error),
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Self::Api(error.into())
    }
}

impl PubSubError for Error {
    fn kind(&self) -> PubSubErrorKind {
        match self {
            Self::Api(e) if e.is_not_found() => PubSubErrorKind::NotFound,
            Self::Api(e) if e.status().is_some() => PubSubErrorKind::External,
            Self::Api(_) => PubSubErrorKind::Other,
        }
    }
}
