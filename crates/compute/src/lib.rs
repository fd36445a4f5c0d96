//! Narrow capability interfaces over the cloud compute control plane.
//!
//! This crate provides:
//! - VM, network interface, forwarding rule and target instance types
//! - `ComputeInventory` for discovering cluster VMs
//! - `NetworkControl` for moving alias IP ranges and forwarding rules
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod error;
pub mod types;

pub use error::{ComputeError, ComputeErrorKind};
pub use types::{
    AliasIpRange, ForwardingRule, GroupMember, NetworkInterface, TargetInstance, Vm, VmStatus,
    last_segment, resource_path, same_resource,
};

use std::collections::BTreeMap;

use async_trait::async_trait;

/// Common base for compute capabilities, fixing the error type.
pub trait ComputeBackend: Clone + Send + Sync + 'static {
    /// The error type for compute operations.
    type Error: ComputeError;
}

/// Read access to the VM inventory, plus labelling.
#[async_trait]
pub trait ComputeInventory: ComputeBackend {
    /// Lists the members of an instance group with their lifecycle status.
    async fn list_group_instances(&self, group: &str) -> Result<Vec<GroupMember>, Self::Error>;

    /// Fetches full metadata for one VM.
    async fn get_instance(&self, zone: &str, name: &str) -> Result<Vm, Self::Error>;

    /// Lists VMs in the region whose label `key` equals `value`.
    async fn list_instances_by_label(
        &self,
        key: &str,
        value: &str,
    ) -> Result<Vec<Vm>, Self::Error>;

    /// Replaces the VM's labels.
    async fn set_labels(
        &self,
        vm: &Vm,
        labels: BTreeMap<String, String>,
    ) -> Result<(), Self::Error>;
}

/// Mutating access to network resources.
///
/// Every mutation waits for the control plane to report completion.
#[async_trait]
pub trait NetworkControl: ComputeBackend {
    /// Replaces the alias IP ranges of `nic` on `instance`.
    async fn update_network_interface(
        &self,
        zone: &str,
        instance: &str,
        nic: &NetworkInterface,
    ) -> Result<(), Self::Error>;

    /// Points `rule` at the target resource `target_self_link`.
    async fn set_forwarding_rule_target(
        &self,
        rule: &ForwardingRule,
        target_self_link: &str,
    ) -> Result<(), Self::Error>;

    /// Lists forwarding rules in the region.
    async fn list_forwarding_rules(&self) -> Result<Vec<ForwardingRule>, Self::Error>;

    /// Lists target instance resources in the region.
    async fn list_target_instances(&self) -> Result<Vec<TargetInstance>, Self::Error>;
}
