use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use futures::future::{join_all, try_join_all};
use halyard_compute::ComputeInventory;
use halyard_object_store::ObjectStore;
use tracing::{debug, info, warn};

use crate::{ClusterStore, Error, ExpiryPolicy, InstanceRecord, LicenseRevoker, Result};

/// A `key=value` label filter selecting external instances.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExternalTag {
    /// Label key.
    pub key: String,

    /// Label value.
    pub value: String,
}

impl FromStr for ExternalTag {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        match tag.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
                Ok(Self {
                    key: key.trim().to_string(),
                    value: value.trim().to_string(),
                })
            }
            _ => Err(Error::InvalidTag(tag.to_string())),
        }
    }
}

impl fmt::Display for ExternalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// What one reconciliation pass looks at.
#[derive(Clone, Debug, Default)]
pub struct ReconcileOptions {
    /// Managed instance group. Without one, no instance is live.
    pub instance_group: Option<String>,

    /// Label selecting instances outside the group.
    pub external_tag: Option<ExternalTag>,
}

/// Merges live inventory with persisted instance records.
pub struct Reconciler<S, C> {
    compute: C,
    expiry: Arc<dyn ExpiryPolicy>,
    revoker: Arc<dyn LicenseRevoker>,
    store: ClusterStore<S>,
}

impl<S, C> Reconciler<S, C>
where
    S: ObjectStore,
    C: ComputeInventory,
{
    /// Creates a reconciler.
    pub fn new(
        store: ClusterStore<S>,
        compute: C,
        expiry: Arc<dyn ExpiryPolicy>,
        revoker: Arc<dyn LicenseRevoker>,
    ) -> Self {
        Self {
            compute,
            expiry,
            revoker,
            store,
        }
    }

    /// Produces the authoritative `instance id -> record` map for this pass.
    ///
    /// Stale records are deleted (with their public keys) and their licenses
    /// revoked; failures of that cleanup are logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if any inventory query or loading the persisted
    /// records fails.
    pub async fn reconcile(
        &self,
        options: &ReconcileOptions,
    ) -> Result<BTreeMap<String, InstanceRecord>> {
        // Live group members, id -> zone.
        let live: BTreeMap<String, String> = match &options.instance_group {
            Some(group) => self
                .compute
                .list_group_instances(group)
                .await
                .map_err(Error::compute)?
                .into_iter()
                .filter(|member| member.status.is_alive())
                .map(|member| (member.name, member.zone))
                .collect(),
            None => BTreeMap::new(),
        };
        debug!("{} live group members", live.len());

        let external = match &options.external_tag {
            Some(tag) => self
                .compute
                .list_instances_by_label(&tag.key, &tag.value)
                .await
                .map_err(Error::compute)?,
            None => Vec::new(),
        };

        let persisted = self.store.get_instances().await?;

        let mut instances = BTreeMap::new();
        let mut stale = Vec::new();
        let now = Utc::now();

        let external_ids: BTreeSet<&str> = external.iter().map(|vm| vm.name.as_str()).collect();

        for (id, mut record) in persisted {
            // Derived from the live label query each pass, never carried over.
            record.external = external_ids.contains(id.as_str());

            if live.contains_key(&id) || record.external {
                record.provider_visible = true;
                instances.insert(id, record);
            } else if record.is_primary && !self.expiry.is_expired(&record, now) {
                info!("keeping primary {id} although the control plane does not report it");
                record.provider_visible = false;
                instances.insert(id, record);
            } else {
                stale.push(record);
            }
        }

        for vm in external.iter() {
            if instances.contains_key(&vm.name) {
                continue;
            }
            if let Some(mut record) = InstanceRecord::from_vm(vm) {
                record.external = true;
                instances.insert(vm.name.clone(), record);
            }
        }

        let missing: Vec<(&String, &String)> = live
            .iter()
            .filter(|(id, _)| !instances.contains_key(*id))
            .collect();
        let fetched = try_join_all(
            missing
                .iter()
                .map(|(id, zone)| self.compute.get_instance(zone, id)),
        )
        .await
        .map_err(Error::compute)?;

        for vm in fetched {
            match InstanceRecord::from_vm(&vm) {
                Some(record) => {
                    debug!("new instance {}", record.instance_id);
                    instances.insert(record.instance_id.clone(), record);
                }
                None => debug!("{} has no network interface yet, skipping", vm.name),
            }
        }

        self.remove_stale(stale).await;

        Ok(instances)
    }

    async fn remove_stale(&self, stale: Vec<InstanceRecord>) {
        if stale.is_empty() {
            return;
        }

        info!(
            "removing stale instances: {}",
            stale
                .iter()
                .map(|record| record.instance_id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let purges = join_all(
            stale
                .iter()
                .map(|record| self.store.purge_instance(&record.instance_id)),
        );
        let revocations = join_all(stale.iter().map(|record| async move {
            if let Err(e) = self.revoker.revoke(record).await {
                warn!("failed to revoke license of {}: {e}", record.instance_id);
            }
        }));

        tokio::join!(purges, revocations);
    }
}
