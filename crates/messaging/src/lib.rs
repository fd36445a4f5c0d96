//! Abstract interface for the cluster's pub/sub channels.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Topic and subscription naming.
pub mod channels;

/// Error types.
pub mod error;

/// Cluster control messages.
pub mod message;

/// Message bodies and their wire envelope.
pub mod payload;

pub use channels::{Channels, contains_resource};
pub use error::{PayloadError, PubSubError, PubSubErrorKind};
pub use message::{ClusterMessage, MessageAction};
pub use payload::{Envelope, Payload};

use std::time::Duration;

use async_trait::async_trait;

/// Messages older than this are dropped from subscriptions by default.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Upper bound on messages returned by one pull.
pub const MAX_PULL_MESSAGES: usize = 100;

/// Options for creating a subscription.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SubscriptionOptions {
    /// How long unacknowledged messages are retained.
    pub retention: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            retention: DEFAULT_RETENTION,
        }
    }
}

/// A topic based pub/sub service.
///
/// `pull` acknowledges everything it returns: a message is consumed even if
/// the caller later fails to process it.
#[async_trait]
pub trait PubSub: Clone + Send + Sync + 'static {
    /// The error type for pub/sub operations.
    type Error: PubSubError;

    /// Creates a topic. Succeeds if it already exists.
    async fn create_topic(&self, name: &str) -> Result<(), Self::Error>;

    /// Creates a subscription on `topic`. Succeeds if it already exists.
    async fn create_subscription(
        &self,
        topic: &str,
        name: &str,
        options: SubscriptionOptions,
    ) -> Result<(), Self::Error>;

    /// Fully qualified names of every topic.
    async fn get_topics(&self) -> Result<Vec<String>, Self::Error>;

    /// Fully qualified names of the subscriptions attached to `topic`.
    async fn get_subscriptions(&self, topic: &str) -> Result<Vec<String>, Self::Error>;

    /// Publishes one message.
    async fn publish(&self, topic: &str, payload: Payload) -> Result<(), Self::Error>;

    /// Pulls one batch without blocking and acknowledges it.
    async fn pull(&self, subscription: &str) -> Result<Vec<Payload>, Self::Error>;
}
