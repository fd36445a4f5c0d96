//! In-memory implementation of the messaging crate.
//!
//! Messages travel through the same envelope encoding as the remote backend,
//! and pulled messages go through ack-id bookkeeping before they are handed
//! back.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use halyard_messaging::{Envelope, MAX_PULL_MESSAGES, Payload, PubSub, SubscriptionOptions};
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug)]
struct Subscription {
    queue: VecDeque<Envelope>,
    topic: String,
}

#[derive(Debug, Default)]
struct State {
    next_ack_id: u64,
    outstanding: HashMap<String, Envelope>,
    subscriptions: BTreeMap<String, Subscription>,
    topics: BTreeSet<String>,
}

/// In-memory pub/sub service.
#[derive(Clone, Debug)]
pub struct MemoryPubSub {
    project: String,
    state: Arc<Mutex<State>>,
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new("local")
    }
}

impl MemoryPubSub {
    /// Creates an empty service whose names are qualified with `project`.
    #[must_use]
    pub fn new<P: Into<String>>(project: P) -> Self {
        Self {
            project: project.into(),
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Delivers a raw envelope to every subscription of `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the topic does not exist.
    pub async fn publish_envelope(&self, topic: &str, envelope: Envelope) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if !state.topics.contains(topic) {
            return Err(Error::TopicNotFound(topic.to_string()));
        }

        for subscription in state
            .subscriptions
            .values_mut()
            .filter(|subscription| subscription.topic == topic)
        {
            subscription.queue.push_back(envelope.clone());
        }

        Ok(())
    }

    /// Number of messages waiting on `subscription`.
    pub async fn pending(&self, subscription: &str) -> usize {
        self.state
            .lock()
            .await
            .subscriptions
            .get(subscription)
            .map_or(0, |subscription| subscription.queue.len())
    }

    /// Number of pulled but unacknowledged messages.
    pub async fn unacknowledged(&self) -> usize {
        self.state.lock().await.outstanding.len()
    }

    fn topic_path(&self, name: &str) -> String {
        format!("projects/{}/topics/{name}", self.project)
    }

    fn subscription_path(&self, name: &str) -> String {
        format!("projects/{}/subscriptions/{name}", self.project)
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    type Error = Error;

    async fn create_topic(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if !state.topics.insert(name.to_string()) {
            debug!("topic {name} already exists");
        }

        Ok(())
    }

    async fn create_subscription(
        &self,
        topic: &str,
        name: &str,
        _options: SubscriptionOptions,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if !state.topics.contains(topic) {
            return Err(Error::TopicNotFound(topic.to_string()));
        }

        state
            .subscriptions
            .entry(name.to_string())
            .or_insert_with(|| Subscription {
                queue: VecDeque::new(),
                topic: topic.to_string(),
            });

        Ok(())
    }

    async fn get_topics(&self) -> Result<Vec<String>, Error> {
        let state = self.state.lock().await;

        Ok(state.topics.iter().map(|name| self.topic_path(name)).collect())
    }

    async fn get_subscriptions(&self, topic: &str) -> Result<Vec<String>, Error> {
        let state = self.state.lock().await;

        if !state.topics.contains(topic) {
            return Err(Error::TopicNotFound(topic.to_string()));
        }

        Ok(state
            .subscriptions
            .iter()
            .filter(|(_, subscription)| subscription.topic == topic)
            .map(|(name, _)| self.subscription_path(name))
            .collect())
    }

    async fn publish(&self, topic: &str, payload: Payload) -> Result<(), Error> {
        self.publish_envelope(topic, payload.encode()).await
    }

    async fn pull(&self, subscription: &str) -> Result<Vec<Payload>, Error> {
        let mut state = self.state.lock().await;
        let state = &mut *state;

        let queue = &mut state
            .subscriptions
            .get_mut(subscription)
            .ok_or_else(|| Error::SubscriptionNotFound(subscription.to_string()))?
            .queue;

        let take = queue.len().min(MAX_PULL_MESSAGES);
        let mut ack_ids = Vec::with_capacity(take);
        for envelope in queue.drain(..take) {
            state.next_ack_id += 1;
            let ack_id = format!("{subscription}-{}", state.next_ack_id);
            state.outstanding.insert(ack_id.clone(), envelope);
            ack_ids.push(ack_id);
        }

        let mut payloads = Vec::with_capacity(ack_ids.len());
        for ack_id in ack_ids {
            let Some(envelope) = state.outstanding.remove(&ack_id) else {
                continue;
            };

            match Payload::decode(&envelope) {
                Ok(payload) => payloads.push(payload),
                Err(e) => warn!("dropping undecodable message on {subscription}: {e}"),
            }
        }

        Ok(payloads)
    }
}
