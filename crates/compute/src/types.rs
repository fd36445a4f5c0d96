//! Compute resource types, independent of any vendor SDK.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a VM as reported by the control plane.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmStatus {
    /// Resources are being allocated.
    Provisioning,

    /// Resources are acquired, the VM is preparing for first boot.
    Staging,

    /// The VM is booting or running.
    Running,

    /// The VM is being stopped.
    Stopping,

    /// The VM is stopped.
    Stopped,

    /// The VM is being suspended.
    Suspending,

    /// The VM is suspended.
    Suspended,

    /// The VM is being repaired.
    Repairing,

    /// The VM is shut down.
    Terminated,

    /// Any status this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl VmStatus {
    /// Whether the VM counts as a live cluster member.
    #[must_use]
    pub const fn is_alive(self) -> bool {
        matches!(self, Self::Provisioning | Self::Staging | Self::Running)
    }

    /// Parses the control plane's status string.
    #[must_use]
    pub fn from_api(status: &str) -> Self {
        match status {
            "PROVISIONING" => Self::Provisioning,
            "STAGING" => Self::Staging,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "SUSPENDING" => Self::Suspending,
            "SUSPENDED" => Self::Suspended,
            "REPAIRING" => Self::Repairing,
            "TERMINATED" => Self::Terminated,
            _ => Self::Unknown,
        }
    }
}

/// A member of an instance group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GroupMember {
    /// Instance name.
    pub name: String,

    /// Short zone name.
    pub zone: String,

    /// Lifecycle status.
    pub status: VmStatus,
}

/// A secondary address block attached to a network interface.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AliasIpRange {
    /// The range, either a bare address or CIDR notation.
    pub ip_cidr_range: String,

    /// Name of the subnetwork secondary range the block comes from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnetwork_range_name: Option<String>,
}

impl AliasIpRange {
    /// A range with no secondary subnetwork range.
    #[must_use]
    pub fn new<R: Into<String>>(ip_cidr_range: R) -> Self {
        Self {
            ip_cidr_range: ip_cidr_range.into(),
            subnetwork_range_name: None,
        }
    }
}

/// A VM network interface.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NetworkInterface {
    /// Interface name, e.g. `nic0`.
    pub name: String,

    /// Primary private address.
    pub network_ip: Option<String>,

    /// External (NAT) addresses from the interface's access configs.
    pub nat_ips: Vec<String>,

    /// Floating address blocks currently attached.
    pub alias_ip_ranges: Vec<AliasIpRange>,

    /// Fingerprint required for optimistic-locking updates.
    pub fingerprint: Option<String>,
}

/// A VM with the fields the cluster logic needs.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Vm {
    /// Instance name (unique within a project and zone).
    pub name: String,

    /// Short zone name.
    pub zone: String,

    /// Custom hostname, when one was assigned at creation.
    pub hostname: Option<String>,

    /// Lifecycle status.
    pub status: Option<VmStatus>,

    /// User labels.
    pub labels: BTreeMap<String, String>,

    /// Fingerprint required when replacing labels.
    pub label_fingerprint: Option<String>,

    /// Network interfaces in attachment order.
    pub network_interfaces: Vec<NetworkInterface>,

    /// Fully qualified resource URL.
    pub self_link: String,
}

impl Vm {
    /// Private address of the first network interface.
    #[must_use]
    pub fn private_ip(&self) -> Option<&str> {
        self.network_interfaces
            .first()
            .and_then(|nic| nic.network_ip.as_deref())
    }

    /// External address of the first network interface, if any.
    #[must_use]
    pub fn public_ip(&self) -> Option<&str> {
        self.network_interfaces
            .first()
            .and_then(|nic| nic.nat_ips.first())
            .map(String::as_str)
    }
}

/// A regional forwarding rule.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ForwardingRule {
    /// Rule name.
    pub name: String,

    /// Region the rule lives in.
    pub region: String,

    /// Address the rule forwards.
    pub ip_address: Option<String>,

    /// Fully qualified URL of the current target resource.
    pub target: Option<String>,
}

/// A target instance resource, used to point forwarding rules at one VM.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TargetInstance {
    /// Resource name.
    pub name: String,

    /// Short zone name.
    pub zone: String,

    /// Fully qualified URL of the VM it targets.
    pub instance: String,

    /// Fully qualified URL of this resource.
    pub self_link: String,
}

/// Returns the `projects/...` part of a resource URL.
///
/// API versions and hosts differ between responses (`compute/v1`,
/// `compute/beta`), the project-relative path does not.
#[must_use]
pub fn resource_path(url: &str) -> &str {
    url.find("projects/").map_or(url, |start| &url[start..])
}

/// Whether two resource URLs point at the same resource.
#[must_use]
pub fn same_resource(a: &str, b: &str) -> bool {
    resource_path(a) == resource_path(b)
}

/// Last path segment of a resource URL, e.g. a zone or instance name.
#[must_use]
pub fn last_segment(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
