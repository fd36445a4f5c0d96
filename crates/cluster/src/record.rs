use chrono::{DateTime, Utc};
use halyard_compute::Vm;
use serde::{Deserialize, Serialize};

/// Progress of an instance towards the primary role.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrimaryStatusKind {
    /// Elected, still taking over.
    BecomingPrimary,

    /// Serving as primary.
    Primary,

    /// Taking over failed.
    Failed,

    /// Written by a newer version.
    #[serde(other)]
    Unknown,
}

/// Primary-role bookkeeping kept on an instance record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryStatus {
    /// Instance the status refers to.
    pub instance_id: String,

    /// Current state.
    pub status: PrimaryStatusKind,

    /// When the status was last written.
    pub last_update: DateTime<Utc>,

    /// When `status` last changed value.
    pub last_status_change: DateTime<Utc>,
}

/// One cluster member as known to the provider.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    /// Unique id, the VM name.
    pub instance_id: String,

    /// Whether the instance holds the primary role.
    #[serde(default)]
    pub is_primary: bool,

    /// Private address of the first interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,

    /// External address of the first interface.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,

    /// Management address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mgmt_ip: Option<String>,

    /// Hostname.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// Zone the VM runs in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,

    /// Whether the control plane currently reports the instance.
    #[serde(default)]
    pub provider_visible: bool,

    /// Whether the instance sits outside the managed group.
    #[serde(default)]
    pub external: bool,

    /// Whether the instance runs a compatible software version.
    #[serde(default)]
    pub version_ok: bool,

    /// Primary-role bookkeeping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_status: Option<PrimaryStatus>,

    /// When the owning instance last wrote this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
}

impl InstanceRecord {
    /// Builds a fresh, visible, non-primary record from VM metadata.
    ///
    /// Returns `None` when the VM has no network interface.
    #[must_use]
    pub fn from_vm(vm: &Vm) -> Option<Self> {
        let nic = vm.network_interfaces.first()?;

        Some(Self {
            instance_id: vm.name.clone(),
            private_ip: nic.network_ip.clone(),
            public_ip: nic.nat_ips.first().cloned(),
            mgmt_ip: nic.network_ip.clone(),
            hostname: Some(vm.hostname.clone().unwrap_or_else(|| vm.name.clone())),
            zone: Some(vm.zone.clone()).filter(|zone| !zone.is_empty()),
            provider_visible: true,
            ..Self::default()
        })
    }
}
