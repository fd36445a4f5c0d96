use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use halyard_compute::{ForwardingRule, TargetInstance, Vm, same_resource};
use halyard_util::parse_ipv4;

/// Outcome of one independent operation in a batch.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OperationResult {
    /// What was operated on.
    pub name: String,

    /// Why it failed, if it did.
    pub error: Option<String>,
}

impl OperationResult {
    /// Whether the operation succeeded.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Rules forwarding one of the owned addresses.
#[must_use]
pub fn owned_rules<'a>(
    rules: &'a [ForwardingRule],
    owned: &BTreeSet<Ipv4Addr>,
) -> Vec<&'a ForwardingRule> {
    rules
        .iter()
        .filter(|rule| {
            rule.ip_address
                .as_deref()
                .and_then(|address| parse_ipv4(address).ok())
                .is_some_and(|ip| owned.contains(&ip))
        })
        .collect()
}

/// The target instance resource pointing at `vm`.
#[must_use]
pub fn target_instance_for<'a>(targets: &'a [TargetInstance], vm: &Vm) -> Option<&'a TargetInstance> {
    targets
        .iter()
        .find(|target| same_resource(&target.instance, &vm.self_link))
}

/// Whether `rule` already forwards to `target`.
#[must_use]
pub fn targets(rule: &ForwardingRule, target: &TargetInstance) -> bool {
    rule.target
        .as_deref()
        .is_some_and(|current| same_resource(current, &target.self_link))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, ip: &str, target: &str) -> ForwardingRule {
        ForwardingRule {
            name: name.to_string(),
            ip_address: Some(ip.to_string()),
            target: Some(target.to_string()),
            ..ForwardingRule::default()
        }
    }

    #[test]
    fn test_owned_rules() {
        let rules = vec![
            rule("a", "35.1.1.1", "t1"),
            rule("b", "35.1.1.2", "t1"),
            ForwardingRule::default(),
        ];
        let owned = BTreeSet::from([Ipv4Addr::new(35, 1, 1, 1)]);

        let found = owned_rules(&rules, &owned);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "a");
    }

    #[test]
    fn test_target_matching_ignores_api_version() {
        let vm = Vm {
            self_link: "https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/bigip-1"
                .to_string(),
            ..Vm::default()
        };
        let target = TargetInstance {
            name: "bigip-1-target".to_string(),
            instance: "https://www.googleapis.com/compute/beta/projects/p/zones/z/instances/bigip-1"
                .to_string(),
            self_link: "https://www.googleapis.com/compute/v1/projects/p/zones/z/targetInstances/bigip-1-target"
                .to_string(),
            ..TargetInstance::default()
        };
        let targets_list = vec![target.clone()];

        assert_eq!(target_instance_for(&targets_list, &vm), Some(&target));
        assert!(targets(
            &rule("a", "35.1.1.1", "projects/p/zones/z/targetInstances/bigip-1-target"),
            &target
        ));
        assert!(!targets(&rule("a", "35.1.1.1", "projects/p/zones/z/targetInstances/other"), &target));
    }
}
