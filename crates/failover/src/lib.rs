//! Moves floating addresses onto this instance after an appliance failover.
//!
//! When the local device becomes active for a traffic group, the alias IP
//! ranges carrying that group's virtual addresses still sit on a peer's
//! network interfaces, and forwarding rules may still point at a peer.
//! `Failover::run` reads the appliance state, removes the ranges from peers,
//! adds them to this instance and retargets forwarding rules.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod appliance;
mod error;
mod forwarding;
mod plan;

pub use appliance::{
    ApplianceError, ApplianceState, FailoverState, TrafficGroupStatus, VirtualAddress,
    owned_addresses,
};
pub use error::Error;
pub use forwarding::{OperationResult, owned_rules, target_instance_for, targets};
pub use plan::{NicPlan, NicUpdate, partition_vms, plan_nic_updates};

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use futures::future::{join_all, try_join_all};
use halyard_compute::{ComputeError, ComputeInventory, ForwardingRule, NetworkControl, Vm};
use halyard_util::{RetryPolicy, retry_when};
use tracing::{debug, info, warn};

/// Label key identifying the VMs of one cluster, by default.
pub const DEFAULT_GROUP_LABEL_KEY: &str = "halyard-group";

/// Static configuration of failover remediation.
#[derive(Clone, Debug)]
pub struct FailoverConfig {
    /// Name of this instance's VM.
    pub instance_name: String,

    /// Label key shared by the cluster's VMs.
    pub group_label_key: String,

    /// Label value shared by the cluster's VMs.
    pub group_label_value: String,

    /// Retries of each NIC update.
    pub nic_retry: RetryPolicy,

    /// Retries of each forwarding rule update.
    pub rule_retry: RetryPolicy,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            instance_name: String::new(),
            group_label_key: DEFAULT_GROUP_LABEL_KEY.to_string(),
            group_label_value: String::new(),
            nic_retry: RetryPolicy::nic_update(),
            rule_retry: RetryPolicy::forwarding_rule(),
        }
    }
}

/// What a remediation run changed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FailoverReport {
    /// Addresses this device is active for.
    pub owned: Vec<Ipv4Addr>,

    /// Peer NICs that lost ranges, as `instance/nic`.
    pub disassociated: Vec<String>,

    /// NICs of this instance that gained ranges, as `instance/nic`.
    pub associated: Vec<String>,

    /// One entry per retargeted forwarding rule.
    pub rules: Vec<OperationResult>,
}

impl FailoverReport {
    /// Whether the run changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.disassociated.is_empty() && self.associated.is_empty() && self.rules.is_empty()
    }
}

/// Options for creating a new `Failover`.
pub struct FailoverOptions<A, C> {
    /// Source of traffic group and virtual address state.
    pub appliance: A,

    /// Compute inventory and network control.
    pub compute: C,

    /// Remediation configuration.
    pub config: FailoverConfig,
}

/// Network remediation for one instance.
pub struct Failover<A, C> {
    appliance: A,
    compute: C,
    config: FailoverConfig,
}

type FailoverError<A, C> =
    Error<<A as ApplianceState>::Error, <C as halyard_compute::ComputeBackend>::Error>;

impl<A, C> Failover<A, C>
where
    A: ApplianceState,
    C: ComputeInventory + NetworkControl,
{
    /// Creates a remediator.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the instance name or group label is empty.
    pub fn new(
        FailoverOptions {
            appliance,
            compute,
            config,
        }: FailoverOptions<A, C>,
    ) -> Result<Self, FailoverError<A, C>> {
        if config.instance_name.trim().is_empty() {
            return Err(Error::Config("instance name must not be empty".to_string()));
        }
        if config.group_label_key.trim().is_empty() || config.group_label_value.trim().is_empty()
        {
            return Err(Error::Config("group label must not be empty".to_string()));
        }

        Ok(Self {
            appliance,
            compute,
            config,
        })
    }

    /// Pulls every address this device is active for onto this instance.
    ///
    /// NIC updates and forwarding rule updates run side by side. Within the
    /// NIC updates, every disassociate finishes before any associate starts.
    ///
    /// # Errors
    ///
    /// Returns an error if the appliance or inventory cannot be read, this
    /// instance is not in the group, a NIC update exhausts its retries, this
    /// instance has no target instance while a rule needs retargeting, or
    /// any rule update exhausts its retries.
    pub async fn run(&self) -> Result<FailoverReport, FailoverError<A, C>> {
        let (statuses, addresses, device) = tokio::try_join!(
            self.appliance.traffic_group_status(),
            self.appliance.virtual_addresses(),
            self.appliance.local_device_name(),
        )
        .map_err(Error::Appliance)?;

        let owned = owned_addresses(&statuses, &addresses, &device);
        info!("{device} is active for {} addresses", owned.len());

        let vms = self
            .compute
            .list_instances_by_label(&self.config.group_label_key, &self.config.group_label_value)
            .await
            .map_err(Error::Compute)?;
        let (me, peers) = partition_vms(vms, &self.config.instance_name)
            .ok_or_else(|| Error::MyVmNotFound(self.config.instance_name.clone()))?;

        let plan = plan_nic_updates(&me, &peers, &owned);

        let (nics, rules) = tokio::join!(
            self.apply_nic_plan(plan),
            self.update_forwarding_rules(&me, &owned)
        );

        match (nics, rules) {
            (Ok((disassociated, associated)), Ok(rules)) => {
                let report = FailoverReport {
                    owned: owned.into_iter().collect(),
                    disassociated,
                    associated,
                    rules,
                };
                info!(
                    "failover done: {} disassociated, {} associated, {} rules",
                    report.disassociated.len(),
                    report.associated.len(),
                    report.rules.len()
                );
                Ok(report)
            }
            (Err(e), Ok(_)) => Err(e),
            (Ok(nics), Err(e)) => {
                debug!("NIC updates done before rule failure: {nics:?}");
                Err(e)
            }
            (Err(e), Err(rules)) => {
                warn!("forwarding rules failed as well: {rules}");
                Err(e)
            }
        }
    }

    async fn apply_nic_plan(
        &self,
        plan: NicPlan,
    ) -> Result<(Vec<String>, Vec<String>), FailoverError<A, C>> {
        if plan.is_empty() {
            debug!("alias ranges already in place");
            return Ok((Vec::new(), Vec::new()));
        }

        let disassociated = self.apply_nic_updates(plan.disassociate, "disassociate").await?;
        let associated = self.apply_nic_updates(plan.associate, "associate").await?;

        Ok((disassociated, associated))
    }

    /// Applies `updates` concurrently. The first failure is returned while
    /// the remaining updates keep running in the background.
    async fn apply_nic_updates(
        &self,
        updates: Vec<NicUpdate>,
        action: &'static str,
    ) -> Result<Vec<String>, FailoverError<A, C>> {
        let handles: Vec<_> = updates
            .into_iter()
            .map(|update| {
                let compute = self.compute.clone();
                let policy = self.config.nic_retry;

                tokio::spawn(async move {
                    let label = format!("{action} {}", update.label());
                    retry_when(
                        &policy,
                        &label,
                        || {
                            compute.update_network_interface(
                                &update.zone,
                                &update.instance,
                                &update.nic,
                            )
                        },
                        is_retryable,
                    )
                    .await?;
                    info!("{label}: {}", update.moved.join(", "));

                    Ok(update.label())
                })
            })
            .collect();

        try_join_all(handles.into_iter().map(|handle| async move {
            match handle.await {
                Ok(result) => result.map_err(Error::Compute),
                Err(e) => Err(Error::BackgroundTask(e)),
            }
        }))
        .await
    }

    async fn update_forwarding_rules(
        &self,
        me: &Vm,
        owned: &BTreeSet<Ipv4Addr>,
    ) -> Result<Vec<OperationResult>, FailoverError<A, C>> {
        if owned.is_empty() {
            return Ok(Vec::new());
        }

        let (rules, target_instances) = tokio::try_join!(
            self.compute.list_forwarding_rules(),
            self.compute.list_target_instances(),
        )
        .map_err(Error::Compute)?;

        let candidates = owned_rules(&rules, owned);
        if candidates.is_empty() {
            debug!("no forwarding rule carries an owned address");
            return Ok(Vec::new());
        }

        let target = target_instance_for(&target_instances, me)
            .ok_or_else(|| Error::TargetInstanceNotFound(me.name.clone()))?;

        let stale: Vec<&ForwardingRule> = candidates
            .into_iter()
            .filter(|rule| !targets(rule, target))
            .collect();
        if stale.is_empty() {
            debug!("forwarding rules already point at {}", target.name);
            return Ok(Vec::new());
        }

        let results = join_all(stale.into_iter().map(|rule| async move {
            let label = format!("retarget {} to {}", rule.name, target.name);
            let result = retry_when(
                &self.config.rule_retry,
                &label,
                || {
                    self.compute
                        .set_forwarding_rule_target(rule, &target.self_link)
                },
                is_retryable,
            )
            .await;

            OperationResult {
                name: rule.name.clone(),
                error: result.err().map(|e| e.to_string()),
            }
        }))
        .await;

        if results.iter().all(OperationResult::is_ok) {
            Ok(results)
        } else {
            Err(Error::ForwardingRules(results))
        }
    }
}

fn is_retryable<E: ComputeError>(error: &E) -> bool {
    error.kind().is_retryable()
}
