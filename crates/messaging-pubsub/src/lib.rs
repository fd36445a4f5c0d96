//! Cloud Pub/Sub REST backend for the messaging crate.
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::{Error, Result};

use std::sync::Arc;

use async_trait::async_trait;
use halyard_messaging::{Envelope, MAX_PULL_MESSAGES, Payload, PubSub, SubscriptionOptions};
use halyard_metadata::{GoogleClient, MetadataClient};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://pubsub.googleapis.com/v1";

/// Options for configuring a `CloudPubSub`.
#[derive(Clone, Debug)]
pub struct CloudPubSubOptions {
    /// Authorized HTTP client.
    pub client: GoogleClient,

    /// Used to discover the project when `project` is not set.
    pub metadata: MetadataClient,

    /// Project owning the topics. Discovered on first use when unset.
    pub project: Option<String>,
}

/// Cloud Pub/Sub backend.
///
/// The project is resolved once, on the first call that needs it.
#[derive(Clone, Debug)]
pub struct CloudPubSub {
    base_url: String,
    client: GoogleClient,
    configured_project: Option<String>,
    metadata: MetadataClient,
    project: Arc<OnceCell<String>>,
}

#[derive(Debug, Deserialize)]
struct TopicResource {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ListTopicsResponse {
    #[serde(default)]
    topics: Vec<TopicResource>,
}

#[derive(Debug, Default, Deserialize)]
struct ListSubscriptionsResponse {
    #[serde(default)]
    subscriptions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionBody {
    topic: String,
    message_retention_duration: String,
}

#[derive(Debug, Serialize)]
struct PublishBody {
    messages: Vec<Envelope>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullBody {
    return_immediately: bool,
    max_messages: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: Envelope,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcknowledgeBody {
    ack_ids: Vec<String>,
}

impl CloudPubSub {
    /// Creates a backend talking to the public Pub/Sub endpoint.
    #[must_use]
    pub fn new(
        CloudPubSubOptions {
            client,
            metadata,
            project,
        }: CloudPubSubOptions,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
            configured_project: project,
            metadata,
            project: Arc::new(OnceCell::new()),
        }
    }

    /// Overrides the API endpoint.
    #[must_use]
    pub fn with_base_url<U: Into<String>>(mut self, base_url: U) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn project(&self) -> Result<&str> {
        let project = self
            .project
            .get_or_try_init(|| async {
                if let Some(project) = &self.configured_project {
                    return Ok::<_, Error>(project.clone());
                }

                let project = self.metadata.project_id().await?;
                info!("using project {project} for pub/sub");
                Ok(project)
            })
            .await?;

        Ok(project.as_str())
    }

    async fn topic_url(&self, topic: &str) -> Result<String> {
        Ok(format!(
            "{}/projects/{}/topics/{topic}",
            self.base_url,
            self.project().await?
        ))
    }

    async fn subscription_url(&self, subscription: &str) -> Result<String> {
        Ok(format!(
            "{}/projects/{}/subscriptions/{subscription}",
            self.base_url,
            self.project().await?
        ))
    }

    async fn upsert<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<()> {
        match self
            .client
            .send_json::<_, serde_json::Value>(Method::PUT, url, body)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_conflict() => {
                debug!("{url} already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PubSub for CloudPubSub {
    type Error = Error;

    async fn create_topic(&self, name: &str) -> Result<()> {
        let url = self.topic_url(name).await?;

        self.upsert(&url, &json!({})).await
    }

    async fn create_subscription(
        &self,
        topic: &str,
        name: &str,
        options: SubscriptionOptions,
    ) -> Result<()> {
        let url = self.subscription_url(name).await?;
        let body = SubscriptionBody {
            topic: format!("projects/{}/topics/{topic}", self.project().await?),
            message_retention_duration: format!("{}s", options.retention.as_secs()),
        };

        self.upsert(&url, &body).await
    }

    async fn get_topics(&self) -> Result<Vec<String>> {
        let url = format!("{}/projects/{}/topics", self.base_url, self.project().await?);
        let response: ListTopicsResponse = self.client.get_json(&url).await?;

        Ok(response.topics.into_iter().map(|topic| topic.name).collect())
    }

    async fn get_subscriptions(&self, topic: &str) -> Result<Vec<String>> {
        let url = format!("{}/subscriptions", self.topic_url(topic).await?);
        let response: ListSubscriptionsResponse = self.client.get_json(&url).await?;

        Ok(response.subscriptions)
    }

    async fn publish(&self, topic: &str, payload: Payload) -> Result<()> {
        let url = format!("{}:publish", self.topic_url(topic).await?);
        let body = PublishBody {
            messages: vec![payload.encode()],
        };

        self.client
            .send_json::<_, serde_json::Value>(Method::POST, &url, &body)
            .await?;

        Ok(())
    }

    async fn pull(&self, subscription: &str) -> Result<Vec<Payload>> {
        let base = self.subscription_url(subscription).await?;
        let body = PullBody {
            return_immediately: true,
            max_messages: MAX_PULL_MESSAGES,
        };

        let response: Option<PullResponse> = self
            .client
            .send_json(Method::POST, &format!("{base}:pull"), &body)
            .await?;
        let received = response.unwrap_or_default().received_messages;

        if received.is_empty() {
            return Ok(Vec::new());
        }

        let ack_ids = received
            .iter()
            .map(|message| message.ack_id.clone())
            .collect();
        self.client
            .send_json::<_, serde_json::Value>(
                Method::POST,
                &format!("{base}:acknowledge"),
                &AcknowledgeBody { ack_ids },
            )
            .await?;

        Ok(received
            .into_iter()
            .filter_map(|received| match Payload::decode(&received.message) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!("dropping undecodable message on {subscription}: {e}");
                    None
                }
            })
            .collect())
    }
}
