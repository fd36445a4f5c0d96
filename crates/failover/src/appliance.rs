use std::collections::{BTreeSet, HashSet};
use std::error::Error as StdError;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use halyard_util::parse_ipv4;
use tracing::debug;

/// Marker trait for appliance state errors.
pub trait ApplianceError: StdError + Send + Sync + 'static {}

/// Failover state of a traffic group on one device.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailoverState {
    /// The device serves the traffic group.
    Active,

    /// The device is ready to take over.
    Standby,

    /// The device cannot serve the traffic group.
    Offline,

    /// Anything else the device reports.
    Unknown,
}

impl FailoverState {
    /// Parses the state string reported by the device.
    #[must_use]
    pub fn from_api(state: &str) -> Self {
        match state.to_ascii_lowercase().as_str() {
            "active" => Self::Active,
            "standby" => Self::Standby,
            "offline" | "forced offline" => Self::Offline,
            _ => Self::Unknown,
        }
    }
}

/// One row of the device's traffic group status table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TrafficGroupStatus {
    /// Traffic group full path, e.g. `/Common/traffic-group-1`.
    pub traffic_group: String,

    /// Device the row is about.
    pub device_name: String,

    /// The device's state for the traffic group.
    pub state: FailoverState,
}

/// A configured virtual address.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VirtualAddress {
    /// Address as configured, possibly with `%route-domain` and `/mask`.
    pub address: String,

    /// Traffic group the address floats with.
    pub traffic_group: String,
}

/// Read-only view of the local appliance's failover state.
#[async_trait]
pub trait ApplianceState: Clone + Send + Sync + 'static {
    /// The error type for appliance queries.
    type Error: ApplianceError;

    /// Traffic group states across the device group.
    async fn traffic_group_status(&self) -> Result<Vec<TrafficGroupStatus>, Self::Error>;

    /// Every configured virtual address.
    async fn virtual_addresses(&self) -> Result<Vec<VirtualAddress>, Self::Error>;

    /// Name of the device this code runs on.
    async fn local_device_name(&self) -> Result<String, Self::Error>;
}

/// Devices are reported either by name or by full path.
fn same_device(a: &str, b: &str) -> bool {
    a.rsplit('/').next() == b.rsplit('/').next()
}

/// Addresses this device serves: every virtual address whose traffic group is
/// active on `device`. Decorations are stripped, non-IPv4 addresses skipped.
#[must_use]
pub fn owned_addresses(
    statuses: &[TrafficGroupStatus],
    addresses: &[VirtualAddress],
    device: &str,
) -> BTreeSet<Ipv4Addr> {
    let active: HashSet<&str> = statuses
        .iter()
        .filter(|status| status.state == FailoverState::Active)
        .filter(|status| same_device(&status.device_name, device))
        .map(|status| status.traffic_group.as_str())
        .collect();

    addresses
        .iter()
        .filter(|address| active.contains(address.traffic_group.as_str()))
        .filter_map(|address| match parse_ipv4(&address.address) {
            Ok(ip) => Some(ip),
            Err(e) => {
                debug!("ignoring virtual address: {e}");
                None
            }
        })
        .collect()
}
