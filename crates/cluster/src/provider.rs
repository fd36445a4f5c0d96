use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use halyard_compute::ComputeInventory;
use halyard_messaging::{
    Channels, ClusterMessage, DEFAULT_RETENTION, MessageAction, Payload, PubSub, PubSubError,
    PubSubErrorKind, SubscriptionOptions,
};
use halyard_object_store::{ObjectInfo, ObjectStore};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::transition::{TransitionHandle, TransitionManager, tag_primary_instance};
use crate::{
    ClusterStore, Error, ExpiryPolicy, ExternalTag, InstanceRecord, LicenseRevoker,
    ReconcileOptions, Reconciler, Result, elect_primary,
};

/// Backups kept besides the newest one, by default.
pub const DEFAULT_MAX_BACKUPS: usize = 7;

/// Default label marking the primary's VM.
pub const DEFAULT_PRIMARY_LABEL: &str = "ha-primary";

/// Static configuration of one provider session.
#[derive(Clone, Debug)]
pub struct ProviderConfig {
    /// Cluster name; derives the channel names.
    pub group: String,

    /// Managed instance group holding the cluster members.
    pub instance_group: Option<String>,

    /// Whether membership is driven by an autoscaler.
    pub autoscale: bool,

    /// Id of the instance running this session.
    pub instance_id: String,

    /// `key=value` label selecting members outside the instance group.
    pub external_tag: Option<String>,

    /// Prior backups kept when a new one is stored.
    pub max_backups: usize,

    /// Label key set to `true` on the primary's VM.
    pub primary_label: String,

    /// Retention of messages in newly created subscriptions.
    pub subscription_retention: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            group: String::new(),
            instance_group: None,
            autoscale: false,
            instance_id: String::new(),
            external_tag: None,
            max_backups: DEFAULT_MAX_BACKUPS,
            primary_label: DEFAULT_PRIMARY_LABEL.to_string(),
            subscription_retention: DEFAULT_RETENTION,
        }
    }
}

impl ProviderConfig {
    /// Checks the configuration and parses the external tag.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a missing group or instance id, or for
    /// autoscaling without an instance group, and `Error::InvalidTag` for a
    /// malformed external tag.
    pub fn validate(&self) -> Result<Option<ExternalTag>> {
        if self.group.trim().is_empty() {
            return Err(Error::Config("group name must not be empty".to_string()));
        }
        if self.instance_id.trim().is_empty() {
            return Err(Error::Config("instance id must not be empty".to_string()));
        }
        if self.autoscale && self.instance_group.is_none() {
            return Err(Error::Config(
                "autoscaling requires an instance group".to_string(),
            ));
        }
        if self.primary_label.trim().is_empty() {
            return Err(Error::Config("primary label must not be empty".to_string()));
        }

        self.external_tag
            .as_deref()
            .map(str::parse::<ExternalTag>)
            .transpose()
    }
}

/// Options for creating a new `GceProvider`.
pub struct GceProviderOptions<S, P, C> {
    /// Session configuration.
    pub config: ProviderConfig,

    /// Compute inventory backend.
    pub compute: C,

    /// Decides when an invisible primary is dropped.
    pub expiry: Arc<dyn ExpiryPolicy>,

    /// Pub/sub backend.
    pub pubsub: P,

    /// Releases licenses of removed instances.
    pub revoker: Arc<dyn LicenseRevoker>,

    /// Object store backend.
    pub store: S,
}

/// One HA provider session: the cluster view of a single instance.
pub struct GceProvider<S, P, C> {
    channels: Channels,
    compute: C,
    config: ProviderConfig,
    reconcile_options: ReconcileOptions,
    reconciler: Reconciler<S, C>,
    pubsub: P,
    store: ClusterStore<S>,
    transitions: TransitionManager<S, P>,
}

impl<S, P, C> GceProvider<S, P, C>
where
    S: ObjectStore,
    P: PubSub,
    C: ComputeInventory,
{
    /// Creates a provider session.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn new(
        GceProviderOptions {
            config,
            compute,
            expiry,
            pubsub,
            revoker,
            store,
        }: GceProviderOptions<S, P, C>,
    ) -> Result<Self> {
        let external_tag = config.validate()?;
        let store = ClusterStore::new(store);

        let transitions = TransitionManager::new(
            store.clone(),
            pubsub.clone(),
            &config.group,
            config.instance_id.clone(),
            SubscriptionOptions {
                retention: config.subscription_retention,
            },
        );

        Ok(Self {
            channels: Channels::for_group(&config.group),
            reconciler: Reconciler::new(store.clone(), compute.clone(), expiry, revoker),
            reconcile_options: ReconcileOptions {
                instance_group: config.instance_group.clone(),
                external_tag,
            },
            compute,
            config,
            pubsub,
            store,
            transitions,
        })
    }

    /// The session configuration.
    pub const fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Typed access to the cluster keyspace.
    pub const fn store(&self) -> &ClusterStore<S> {
        &self.store
    }

    /// Reconciles live inventory with persisted records.
    ///
    /// # Errors
    ///
    /// Returns an error if an inventory query or the record load fails.
    pub async fn get_instances(&self) -> Result<BTreeMap<String, InstanceRecord>> {
        self.reconciler.reconcile(&self.reconcile_options).await
    }

    /// Elects the primary from a reconciled instance map.
    #[must_use]
    pub fn elect_primary(&self, instances: &BTreeMap<String, InstanceRecord>) -> Option<String> {
        elect_primary(instances)
    }

    /// Starts the role transition for a newly elected primary.
    #[must_use]
    pub fn primary_elected(&self, primary_id: &str) -> TransitionHandle {
        self.transitions.primary_elected(primary_id)
    }

    /// Moves the primary label to `primary_id`'s VM. Returns the ids whose
    /// labels changed.
    pub async fn tag_primary_instance(
        &self,
        primary_id: &str,
        instances: &BTreeMap<String, InstanceRecord>,
    ) -> Vec<String> {
        tag_primary_instance(
            &self.compute,
            &self.config.primary_label,
            primary_id,
            instances,
        )
        .await
    }

    /// Persists a record, stamping its `last_update`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn put_instance(&self, mut record: InstanceRecord) -> Result<InstanceRecord> {
        record.last_update = Some(Utc::now());
        self.store.put_instance(&record).await?;

        Ok(record)
    }

    /// Loads a persisted record.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the record does not decode.
    pub async fn get_instance(&self, instance_id: &str) -> Result<Option<InstanceRecord>> {
        self.store.get_instance(instance_id).await
    }

    /// Publishes a control message on the action's topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded or published.
    pub async fn send_message(
        &self,
        action: MessageAction,
        to_instance_id: Option<&str>,
        data: Value,
    ) -> Result<()> {
        let message = ClusterMessage {
            action,
            to_instance_id: to_instance_id.map(String::from),
            from_instance_id: self.config.instance_id.clone(),
            data,
        };
        let topic = self.channels.topic_for(action);

        self.pubsub
            .publish(topic, Payload::json(&message)?)
            .await
            .map_err(Error::pubsub)?;
        debug!("sent {action:?} to {topic}");

        Ok(())
    }

    /// Pulls pending control messages of the given actions addressed to
    /// `to_instance_id` or broadcast.
    ///
    /// Pulled messages are acknowledged whether or not they match. A missing
    /// subscription yields nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if a pull fails for a reason other than a missing
    /// subscription.
    pub async fn get_messages(
        &self,
        actions: &[MessageAction],
        to_instance_id: &str,
    ) -> Result<Vec<ClusterMessage>> {
        let mut seen = BTreeSet::new();
        let mut messages = Vec::new();

        for &action in actions {
            let subscription = Channels::subscription_for(action, &self.config.instance_id);
            if !seen.insert(subscription.clone()) {
                continue;
            }

            let payloads = match self.pubsub.pull(&subscription).await {
                Ok(payloads) => payloads,
                Err(e) if e.kind() == PubSubErrorKind::NotFound => {
                    debug!("{subscription} does not exist yet");
                    continue;
                }
                Err(e) => return Err(Error::pubsub(e)),
            };

            for payload in payloads {
                match payload.to_json::<ClusterMessage>() {
                    Ok(message) if actions.contains(&message.action) => {
                        if message.is_for(to_instance_id) {
                            messages.push(message);
                        }
                    }
                    Ok(message) => debug!("ignoring {:?} message", message.action),
                    Err(e) => warn!("dropping malformed message from {subscription}: {e}"),
                }
            }
        }

        info!("{} messages for {to_instance_id}", messages.len());
        Ok(messages)
    }

    /// Reads an instance's public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails for a reason other than absence.
    pub async fn get_public_key(&self, instance_id: &str) -> Result<Option<Bytes>> {
        self.store.get_public_key(instance_id).await
    }

    /// Stores this instance's public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn put_public_key(&self, key: Bytes) -> Result<()> {
        self.store
            .put_public_key(&self.config.instance_id, key)
            .await
    }

    /// Reads the credentials published by the primary.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the object is not JSON.
    pub async fn get_primary_credentials(&self) -> Result<Option<Value>> {
        self.store.get_primary_credentials().await
    }

    /// Publishes the primary's credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn put_primary_credentials(&self, credentials: Value) -> Result<()> {
        self.store.put_primary_credentials(credentials).await
    }

    /// Stores a backup, pruning to the configured number of prior copies.
    /// Returns the names of the pruned backups.
    ///
    /// # Errors
    ///
    /// Returns an error if writing or listing fails.
    pub async fn store_backup(&self, file_name: &str, contents: Bytes) -> Result<Vec<String>> {
        self.store
            .store_backup(file_name, contents, self.config.max_backups)
            .await
    }

    /// The newest stored backup.
    ///
    /// # Errors
    ///
    /// Returns an error if listing fails.
    pub async fn latest_backup(&self) -> Result<Option<ObjectInfo>> {
        self.store.latest_backup().await
    }
}
