//! Compute Engine v1 resource shapes and their mapping to domain types.

use std::collections::BTreeMap;

use halyard_compute::{
    AliasIpRange, ForwardingRule, GroupMember, NetworkInterface, TargetInstance, Vm, VmStatus,
    last_segment,
};
use serde::{Deserialize, Serialize};

pub trait Paged {
    fn next_page_token(&self) -> Option<&str>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct List<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

impl<T> Paged for List<T> {
    fn next_page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedList<T> {
    #[serde(default = "BTreeMap::new")]
    pub items: BTreeMap<String, T>,
    pub next_page_token: Option<String>,
}

impl<T> Paged for AggregatedList<T> {
    fn next_page_token(&self) -> Option<&str> {
        self.next_page_token.as_deref()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InstancesScope {
    #[serde(default)]
    pub instances: Vec<Instance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInstancesScope {
    #[serde(default)]
    pub target_instances: Vec<TargetInstanceResource>,
}

#[derive(Debug, Deserialize)]
pub struct GroupInstance {
    pub instance: String,
    pub status: String,
}

impl From<GroupInstance> for GroupMember {
    fn from(item: GroupInstance) -> Self {
        // .../zones/<zone>/instances/<name>
        let mut segments = item.instance.rsplit('/');
        let name = segments.next().unwrap_or_default().to_string();
        let zone = segments.nth(1).unwrap_or_default().to_string();

        Self {
            name,
            zone,
            status: VmStatus::from_api(&item.status),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AccessConfig {
    #[serde(rename = "natIP")]
    pub nat_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nic {
    pub name: String,
    #[serde(rename = "networkIP")]
    pub network_ip: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
    #[serde(default)]
    pub alias_ip_ranges: Vec<AliasIpRange>,
    pub fingerprint: Option<String>,
}

impl From<Nic> for NetworkInterface {
    fn from(nic: Nic) -> Self {
        Self {
            name: nic.name,
            network_ip: nic.network_ip,
            nat_ips: nic
                .access_configs
                .into_iter()
                .filter_map(|config| config.nat_ip)
                .collect(),
            alias_ip_ranges: nic.alias_ip_ranges,
            fingerprint: nic.fingerprint,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub name: String,
    #[serde(default)]
    pub zone: String,
    pub hostname: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub label_fingerprint: Option<String>,
    #[serde(default)]
    pub network_interfaces: Vec<Nic>,
    #[serde(default)]
    pub self_link: String,
}

impl From<Instance> for Vm {
    fn from(instance: Instance) -> Self {
        Self {
            zone: last_segment(&instance.zone).to_string(),
            status: instance.status.as_deref().map(VmStatus::from_api),
            network_interfaces: instance
                .network_interfaces
                .into_iter()
                .map(Into::into)
                .collect(),
            name: instance.name,
            hostname: instance.hostname,
            labels: instance.labels,
            label_fingerprint: instance.label_fingerprint,
            self_link: instance.self_link,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardingRuleResource {
    pub name: String,
    #[serde(default)]
    pub region: String,
    #[serde(rename = "IPAddress")]
    pub ip_address: Option<String>,
    pub target: Option<String>,
}

impl From<ForwardingRuleResource> for ForwardingRule {
    fn from(rule: ForwardingRuleResource) -> Self {
        Self {
            region: last_segment(&rule.region).to_string(),
            name: rule.name,
            ip_address: rule.ip_address,
            target: rule.target,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInstanceResource {
    pub name: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub instance: String,
    #[serde(default)]
    pub self_link: String,
}

impl From<TargetInstanceResource> for TargetInstance {
    fn from(target: TargetInstanceResource) -> Self {
        Self {
            zone: last_segment(&target.zone).to_string(),
            name: target.name,
            instance: target.instance,
            self_link: target.self_link,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NicUpdate<'a> {
    pub alias_ip_ranges: &'a [AliasIpRange],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetLabels<'a> {
    pub labels: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_fingerprint: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub struct SetTarget<'a> {
    pub target: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct OperationErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct OperationErrors {
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub status: String,
    pub error: Option<OperationErrors>,
    #[serde(default)]
    pub self_link: String,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status == "DONE"
    }
}
