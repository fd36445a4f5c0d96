//! Mock implementation of the compute interfaces for testing purposes.
//!
//! All state lives in memory. Every mutation is appended to an event log so
//! tests can check what was changed and in which order, and failures can be
//! injected per instance or per forwarding rule.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use halyard_compute::{
    ComputeBackend, ComputeInventory, ForwardingRule, GroupMember, NetworkControl,
    NetworkInterface, TargetInstance, Vm,
};
use tokio::sync::Mutex;
use tracing::debug;

/// A mutation applied through the mock.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MutationEvent {
    /// Alias IP ranges of a NIC were replaced.
    NicUpdate {
        /// Instance name.
        instance: String,
        /// Interface name.
        nic: String,
        /// The new alias ranges.
        alias_ip_ranges: Vec<String>,
    },

    /// A forwarding rule was pointed at a new target.
    RuleTarget {
        /// Rule name.
        rule: String,
        /// New target URL.
        target: String,
    },

    /// Labels of an instance were replaced.
    Labels {
        /// Instance name.
        instance: String,
        /// The new labels.
        labels: BTreeMap<String, String>,
    },
}

#[derive(Debug, Default)]
struct State {
    events: Vec<MutationEvent>,
    fail_inventory: bool,
    forwarding_rules: Vec<ForwardingRule>,
    groups: HashMap<String, Vec<GroupMember>>,
    nic_attempts: HashMap<String, u32>,
    nic_failures: HashMap<String, u32>,
    nic_rejections: HashSet<String>,
    rule_failures: HashMap<String, u32>,
    target_instances: Vec<TargetInstance>,
    vms: BTreeMap<String, Vm>,
}

/// In-memory compute control plane.
#[derive(Clone, Debug, Default)]
pub struct MockCompute {
    state: Arc<Mutex<State>>,
}

impl MockCompute {
    /// Creates an empty mock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a VM.
    pub async fn add_vm(&self, vm: Vm) {
        self.state.lock().await.vms.insert(vm.name.clone(), vm);
    }

    /// Adds a member to an instance group.
    pub async fn add_group_member(&self, group: &str, member: GroupMember) {
        self.state
            .lock()
            .await
            .groups
            .entry(group.to_string())
            .or_default()
            .push(member);
    }

    /// Adds a forwarding rule.
    pub async fn add_forwarding_rule(&self, rule: ForwardingRule) {
        self.state.lock().await.forwarding_rules.push(rule);
    }

    /// Adds a target instance.
    pub async fn add_target_instance(&self, target: TargetInstance) {
        self.state.lock().await.target_instances.push(target);
    }

    /// Makes the next `times` NIC updates on `instance` fail as not ready.
    /// `u32::MAX` fails forever.
    pub async fn fail_nic_updates(&self, instance: &str, times: u32) {
        self.state
            .lock()
            .await
            .nic_failures
            .insert(instance.to_string(), times);
    }

    /// Makes every NIC update on `instance` fail as rejected.
    pub async fn reject_nic_updates(&self, instance: &str) {
        self.state
            .lock()
            .await
            .nic_rejections
            .insert(instance.to_string());
    }

    /// Number of NIC updates attempted on `instance`, failed ones included.
    pub async fn nic_update_attempts(&self, instance: &str) -> u32 {
        self.state
            .lock()
            .await
            .nic_attempts
            .get(instance)
            .copied()
            .unwrap_or_default()
    }

    /// Makes the next `times` target updates of `rule` fail as not ready.
    /// `u32::MAX` fails forever.
    pub async fn fail_rule_updates(&self, rule: &str, times: u32) {
        self.state
            .lock()
            .await
            .rule_failures
            .insert(rule.to_string(), times);
    }

    /// Makes every inventory query fail while `fail` is set.
    pub async fn fail_inventory(&self, fail: bool) {
        self.state.lock().await.fail_inventory = fail;
    }

    /// Returns the mutation log in application order.
    pub async fn events(&self) -> Vec<MutationEvent> {
        self.state.lock().await.events.clone()
    }

    /// Returns the current state of a VM.
    pub async fn vm(&self, name: &str) -> Option<Vm> {
        self.state.lock().await.vms.get(name).cloned()
    }

    /// Returns the current state of a forwarding rule.
    pub async fn forwarding_rule(&self, name: &str) -> Option<ForwardingRule> {
        self.state
            .lock()
            .await
            .forwarding_rules
            .iter()
            .find(|rule| rule.name == name)
            .cloned()
    }
}

fn take_failure(failures: &mut HashMap<String, u32>, key: &str) -> bool {
    match failures.get_mut(key) {
        None => false,
        Some(remaining) if *remaining == 0 => false,
        Some(remaining) if *remaining == u32::MAX => true,
        Some(remaining) => {
            *remaining -= 1;
            true
        }
    }
}

impl ComputeBackend for MockCompute {
    type Error = Error;
}

#[async_trait]
impl ComputeInventory for MockCompute {
    async fn list_group_instances(&self, group: &str) -> Result<Vec<GroupMember>, Error> {
        let state = self.state.lock().await;
        if state.fail_inventory {
            return Err(Error::Unavailable);
        }

        Ok(state.groups.get(group).cloned().unwrap_or_default())
    }

    async fn get_instance(&self, zone: &str, name: &str) -> Result<Vm, Error> {
        let state = self.state.lock().await;
        if state.fail_inventory {
            return Err(Error::Unavailable);
        }

        state
            .vms
            .get(name)
            .filter(|vm| vm.zone == zone)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("{zone}/{name}")))
    }

    async fn list_instances_by_label(&self, key: &str, value: &str) -> Result<Vec<Vm>, Error> {
        let state = self.state.lock().await;
        if state.fail_inventory {
            return Err(Error::Unavailable);
        }

        Ok(state
            .vms
            .values()
            .filter(|vm| vm.labels.get(key).is_some_and(|v| v == value))
            .cloned()
            .collect())
    }

    async fn set_labels(&self, vm: &Vm, labels: BTreeMap<String, String>) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        let stored = state
            .vms
            .get_mut(&vm.name)
            .ok_or_else(|| Error::NotFound(vm.name.clone()))?;

        stored.labels.clone_from(&labels);
        state.events.push(MutationEvent::Labels {
            instance: vm.name.clone(),
            labels,
        });

        Ok(())
    }
}

#[async_trait]
impl NetworkControl for MockCompute {
    async fn update_network_interface(
        &self,
        zone: &str,
        instance: &str,
        nic: &NetworkInterface,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        *state.nic_attempts.entry(instance.to_string()).or_default() += 1;

        if state.nic_rejections.contains(instance) {
            return Err(Error::Rejected(format!("{instance}/{}", nic.name)));
        }
        if take_failure(&mut state.nic_failures, instance) {
            return Err(Error::NotReady(format!("{instance}/{}", nic.name)));
        }

        let stored = state
            .vms
            .get_mut(instance)
            .filter(|vm| vm.zone == zone)
            .and_then(|vm| {
                vm.network_interfaces
                    .iter_mut()
                    .find(|stored| stored.name == nic.name)
            })
            .ok_or_else(|| Error::NotFound(format!("{zone}/{instance}/{}", nic.name)))?;

        stored.alias_ip_ranges.clone_from(&nic.alias_ip_ranges);
        debug!(
            "mock: {instance}/{} now has {} alias ranges",
            nic.name,
            nic.alias_ip_ranges.len()
        );

        state.events.push(MutationEvent::NicUpdate {
            instance: instance.to_string(),
            nic: nic.name.clone(),
            alias_ip_ranges: nic
                .alias_ip_ranges
                .iter()
                .map(|range| range.ip_cidr_range.clone())
                .collect(),
        });

        Ok(())
    }

    async fn set_forwarding_rule_target(
        &self,
        rule: &ForwardingRule,
        target_self_link: &str,
    ) -> Result<(), Error> {
        let mut state = self.state.lock().await;

        if take_failure(&mut state.rule_failures, &rule.name) {
            return Err(Error::NotReady(rule.name.clone()));
        }

        let stored = state
            .forwarding_rules
            .iter_mut()
            .find(|stored| stored.name == rule.name)
            .ok_or_else(|| Error::NotFound(rule.name.clone()))?;

        stored.target = Some(target_self_link.to_string());
        state.events.push(MutationEvent::RuleTarget {
            rule: rule.name.clone(),
            target: target_self_link.to_string(),
        });

        Ok(())
    }

    async fn list_forwarding_rules(&self) -> Result<Vec<ForwardingRule>, Error> {
        let state = self.state.lock().await;
        if state.fail_inventory {
            return Err(Error::Unavailable);
        }

        Ok(state.forwarding_rules.clone())
    }

    async fn list_target_instances(&self) -> Result<Vec<TargetInstance>, Error> {
        let state = self.state.lock().await;
        if state.fail_inventory {
            return Err(Error::Unavailable);
        }

        Ok(state.target_instances.clone())
    }
}
