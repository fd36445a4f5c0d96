use std::collections::BTreeMap;

use halyard_util::ip_to_u32;
use tracing::{debug, warn};

use crate::InstanceRecord;

/// Picks the primary among eligible instances.
///
/// Eligible means `version_ok && provider_visible`. The winner has the
/// numerically lowest private IPv4 address; if any eligible instance is
/// external, the lowest external one wins instead. Instances whose private
/// address does not parse are skipped. Two instances sharing an address is
/// invalid input; the first one in map order wins.
///
/// Returns `None` when nothing is eligible.
#[must_use]
pub fn elect_primary(instances: &BTreeMap<String, InstanceRecord>) -> Option<String> {
    let mut lowest: Option<(u32, &str)> = None;
    let mut lowest_external: Option<(u32, &str)> = None;

    for (id, record) in instances {
        if !(record.version_ok && record.provider_visible) {
            debug!("{id} is not eligible for election");
            continue;
        }

        let ip = match record.private_ip.as_deref().map(ip_to_u32) {
            Some(Ok(ip)) => ip,
            Some(Err(e)) => {
                warn!("{id} is not eligible for election: {e}");
                continue;
            }
            None => {
                warn!("{id} is not eligible for election: no private address");
                continue;
            }
        };

        if lowest.is_none_or(|(best, _)| ip < best) {
            lowest = Some((ip, id));
        }
        if record.external && lowest_external.is_none_or(|(best, _)| ip < best) {
            lowest_external = Some((ip, id));
        }
    }

    lowest_external
        .or(lowest)
        .map(|(_, id)| id.to_string())
}
