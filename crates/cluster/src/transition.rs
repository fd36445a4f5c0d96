use std::collections::BTreeMap;

use futures::future::join_all;
use halyard_compute::{ComputeInventory, Vm};
use halyard_messaging::{
    Channels, MessageAction, PubSub, SubscriptionOptions, contains_resource,
};
use halyard_object_store::ObjectStore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{ClusterStore, Error, InstanceRecord, Result};

/// Topics and subscription created while provisioning channels.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChannelReport {
    /// Topics that did not exist yet.
    pub created_topics: Vec<String>,

    /// The subscription this instance listens on.
    pub subscription: String,

    /// Whether the subscription had to be created.
    pub subscription_created: bool,
}

/// Outcome of both halves of a role transition.
#[derive(Debug)]
pub struct TransitionReport {
    /// Channel provisioning result.
    pub provisioning: Result<ChannelReport>,

    /// Ids of records whose primary flag was cleared.
    pub demoted: Result<Vec<String>>,
}

/// Background work started by a role transition.
///
/// Dropping the handle leaves the work running.
#[derive(Debug)]
pub struct TransitionHandle {
    demotion: JoinHandle<Result<Vec<String>>>,
    provisioning: JoinHandle<Result<ChannelReport>>,
}

impl TransitionHandle {
    /// Waits for both tasks to finish.
    pub async fn wait(self) -> TransitionReport {
        let (provisioning, demotion) = tokio::join!(self.provisioning, self.demotion);

        TransitionReport {
            provisioning: provisioning.map_err(Error::from).and_then(|result| result),
            demoted: demotion.map_err(Error::from).and_then(|result| result),
        }
    }
}

/// Reacts to election results: provisions this instance's channels and
/// demotes stale primaries.
#[derive(Clone, Debug)]
pub struct TransitionManager<S, P> {
    channels: Channels,
    instance_id: String,
    pubsub: P,
    store: ClusterStore<S>,
    subscription_options: SubscriptionOptions,
}

impl<S, P> TransitionManager<S, P>
where
    S: ObjectStore,
    P: PubSub,
{
    /// Creates a manager acting for `instance_id` in cluster `group`.
    pub fn new(
        store: ClusterStore<S>,
        pubsub: P,
        group: &str,
        instance_id: impl Into<String>,
        subscription_options: SubscriptionOptions,
    ) -> Self {
        Self {
            channels: Channels::for_group(group),
            instance_id: instance_id.into(),
            pubsub,
            store,
            subscription_options,
        }
    }

    /// Starts channel provisioning and demotion of stale primaries as two
    /// independent background tasks.
    #[must_use]
    pub fn primary_elected(&self, primary_id: &str) -> TransitionHandle {
        let action = if primary_id == self.instance_id {
            MessageAction::Join
        } else {
            MessageAction::SyncComplete
        };
        info!(
            "{primary_id} elected primary, {} listens for {action:?}",
            self.instance_id
        );

        let provisioning = {
            let this = self.clone();
            tokio::spawn(async move {
                let result = this.provision_channels(action).await;
                if let Err(e) = &result {
                    warn!("channel provisioning failed: {e}");
                }
                result
            })
        };

        let demotion = {
            let store = self.store.clone();
            let primary_id = primary_id.to_string();
            tokio::spawn(async move {
                let result = demote_stale_primaries(&store, &primary_id).await;
                if let Err(e) = &result {
                    warn!("demoting stale primaries failed: {e}");
                }
                result
            })
        };

        TransitionHandle {
            demotion,
            provisioning,
        }
    }

    async fn provision_channels(&self, action: MessageAction) -> Result<ChannelReport> {
        let existing = self.pubsub.get_topics().await.map_err(Error::pubsub)?;

        let mut created_topics = Vec::new();
        for topic in [
            &self.channels.join_topic,
            &self.channels.sync_complete_topic,
        ] {
            if contains_resource(&existing, topic) {
                continue;
            }

            self.pubsub
                .create_topic(topic)
                .await
                .map_err(Error::pubsub)?;
            info!("created topic {topic}");
            created_topics.push(topic.clone());
        }

        let topic = self.channels.topic_for(action);
        let subscription = Channels::subscription_for(action, &self.instance_id);

        let subscriptions = self
            .pubsub
            .get_subscriptions(topic)
            .await
            .map_err(Error::pubsub)?;
        let subscription_created = if contains_resource(&subscriptions, &subscription) {
            debug!("subscription {subscription} exists");
            false
        } else {
            self.pubsub
                .create_subscription(topic, &subscription, self.subscription_options)
                .await
                .map_err(Error::pubsub)?;
            info!("created subscription {subscription} on {topic}");
            true
        };

        Ok(ChannelReport {
            created_topics,
            subscription,
            subscription_created,
        })
    }
}

/// Clears the primary flag of every persisted record other than
/// `primary_id`. Returns the ids that were demoted.
///
/// # Errors
///
/// Returns an error if the records cannot be loaded. Failed writes are
/// logged and left out of the result.
pub async fn demote_stale_primaries<S: ObjectStore>(
    store: &ClusterStore<S>,
    primary_id: &str,
) -> Result<Vec<String>> {
    let stale: Vec<InstanceRecord> = store
        .get_instances()
        .await?
        .into_values()
        .filter(|record| record.is_primary && record.instance_id != primary_id)
        .map(|mut record| {
            record.is_primary = false;
            record
        })
        .collect();

    let results = join_all(stale.iter().map(|record| store.put_instance(record))).await;

    let mut demoted = Vec::with_capacity(stale.len());
    for (record, result) in stale.into_iter().zip(results) {
        match result {
            Ok(()) => {
                info!("demoted {}", record.instance_id);
                demoted.push(record.instance_id);
            }
            Err(e) => warn!("failed to demote {}: {e}", record.instance_id),
        }
    }

    Ok(demoted)
}

/// Labels the primary's VM with `label_key=true` and removes the label from
/// every other visible member of the managed group. An external primary is
/// labelled as well; other external members are left alone.
///
/// Best effort per instance. Returns the ids whose labels changed.
pub async fn tag_primary_instance<C: ComputeInventory>(
    compute: &C,
    label_key: &str,
    primary_id: &str,
    instances: &BTreeMap<String, InstanceRecord>,
) -> Vec<String> {
    let candidates = instances
        .values()
        .filter(|record| {
            record.provider_visible && (!record.external || record.instance_id == primary_id)
        });

    let results = join_all(candidates.map(|record| async move {
        let Some(zone) = record.zone.as_deref() else {
            debug!("{} has no zone on record, not labelling", record.instance_id);
            return None;
        };

        let vm = match compute.get_instance(zone, &record.instance_id).await {
            Ok(vm) => vm,
            Err(e) => {
                warn!("failed to look up {}: {e}", record.instance_id);
                return None;
            }
        };

        let labels = primary_labels(&vm, label_key, record.instance_id == primary_id)?;
        match compute.set_labels(&vm, labels).await {
            Ok(()) => Some(record.instance_id.clone()),
            Err(e) => {
                warn!("failed to label {}: {e}", record.instance_id);
                None
            }
        }
    }))
    .await;

    results.into_iter().flatten().collect()
}

/// The VM's labels with the primary marker set or cleared, or `None` if
/// they are already right.
fn primary_labels(vm: &Vm, label_key: &str, primary: bool) -> Option<BTreeMap<String, String>> {
    let mut labels = vm.labels.clone();

    let changed = if primary {
        labels.insert(label_key.to_string(), "true".to_string()) != Some("true".to_string())
    } else {
        labels.remove(label_key).is_some()
    };

    changed.then_some(labels)
}
