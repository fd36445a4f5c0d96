use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

use cidr::Ipv4Inet;
use halyard_compute::{AliasIpRange, NetworkInterface, Vm};
use tracing::{debug, warn};

/// One NIC whose alias IP ranges get replaced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NicUpdate {
    /// Instance owning the NIC.
    pub instance: String,

    /// Zone of the instance.
    pub zone: String,

    /// The NIC with its new alias ranges.
    pub nic: NetworkInterface,

    /// Ranges removed from or added to the NIC.
    pub moved: Vec<String>,
}

impl NicUpdate {
    /// `instance/nic`, for logs and reports.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.instance, self.nic.name)
    }
}

/// NIC updates needed to pull owned addresses onto this instance.
///
/// Every disassociate must complete before any associate starts.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NicPlan {
    /// Peer NICs losing ranges.
    pub disassociate: Vec<NicUpdate>,

    /// NICs of this instance gaining ranges.
    pub associate: Vec<NicUpdate>,
}

impl NicPlan {
    /// Whether nothing needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.disassociate.is_empty() && self.associate.is_empty()
    }
}

/// Splits the group's VMs into this instance and its peers.
///
/// Returns `None` if `my_name` is not among `vms`.
#[must_use]
pub fn partition_vms(vms: Vec<Vm>, my_name: &str) -> Option<(Vm, Vec<Vm>)> {
    let (mine, peers): (Vec<Vm>, Vec<Vm>) = vms.into_iter().partition(|vm| vm.name == my_name);

    mine.into_iter().next().map(|me| (me, peers))
}

/// Whether the alias range covers `address`. A bare address is a `/32`.
fn range_contains(range: &str, address: Ipv4Addr) -> bool {
    let range = range.trim();
    let parsed = if range.contains('/') {
        Ipv4Inet::from_str(range)
    } else {
        Ipv4Inet::from_str(&format!("{range}/32"))
    };

    match parsed {
        Ok(inet) => inet.network().contains(&address),
        Err(e) => {
            warn!("ignoring alias range {range}: {e}");
            false
        }
    }
}

/// Plans the NIC updates that move every peer alias range covering an owned
/// address onto the same-named NIC of `me`.
#[must_use]
pub fn plan_nic_updates(me: &Vm, peers: &[Vm], owned: &BTreeSet<Ipv4Addr>) -> NicPlan {
    let mut plan = NicPlan::default();
    if owned.is_empty() {
        debug!("no owned addresses, nothing to move");
        return plan;
    }

    // (source NIC name, range) pairs taken from peers.
    let mut taken: Vec<(String, AliasIpRange)> = Vec::new();

    for peer in peers {
        for nic in &peer.network_interfaces {
            let (matching, kept): (Vec<AliasIpRange>, Vec<AliasIpRange>) = nic
                .alias_ip_ranges
                .iter()
                .cloned()
                .partition(|range| {
                    owned
                        .iter()
                        .any(|address| range_contains(&range.ip_cidr_range, *address))
                });

            if matching.is_empty() {
                continue;
            }

            let moved = matching
                .iter()
                .map(|range| range.ip_cidr_range.clone())
                .collect();
            taken.extend(matching.into_iter().map(|range| (nic.name.clone(), range)));

            plan.disassociate.push(NicUpdate {
                instance: peer.name.clone(),
                zone: peer.zone.clone(),
                nic: NetworkInterface {
                    alias_ip_ranges: kept,
                    ..nic.clone()
                },
                moved,
            });
        }
    }

    for nic in &me.network_interfaces {
        let mut updated = nic.clone();
        let mut moved = Vec::new();

        for (source, range) in &taken {
            if *source != nic.name || updated.alias_ip_ranges.contains(range) {
                continue;
            }

            moved.push(range.ip_cidr_range.clone());
            updated.alias_ip_ranges.push(range.clone());
        }

        if !moved.is_empty() {
            plan.associate.push(NicUpdate {
                instance: me.name.clone(),
                zone: me.zone.clone(),
                nic: updated,
                moved,
            });
        }
    }

    for (source, range) in &taken {
        if !me.network_interfaces.iter().any(|nic| nic.name == *source) {
            warn!(
                "{} has no interface {source} to take {} from a peer",
                me.name, range.ip_cidr_range
            );
        }
    }

    plan
}
