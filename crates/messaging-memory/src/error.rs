use halyard_messaging::{PubSubError, PubSubErrorKind};
use thiserror::Error;

/// Errors from the in-memory pub/sub.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// No such subscription.
    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// No such topic.
    #[error("topic not found: {0}")]
    TopicNotFound(String),
}

impl PubSubError for Error {
    fn kind(&self) -> PubSubErrorKind {
        match self {
            Self::SubscriptionNotFound(_) | Self::TopicNotFound(_) => PubSubErrorKind::NotFound,
        }
    }
}
