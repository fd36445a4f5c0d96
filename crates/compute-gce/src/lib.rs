//! Compute Engine REST backend for the compute capability traits.
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod wire;

pub use error::{Error, Result};

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use halyard_compute::{
    ComputeBackend, ComputeInventory, ForwardingRule, GroupMember, NetworkControl,
    NetworkInterface, TargetInstance, Vm, last_segment,
};
use halyard_metadata::{GoogleClient, region_from_zone};
use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use wire::{
    AggregatedList, GroupInstance, Instance, InstancesScope, List, NicUpdate, Operation, Paged,
    SetLabels, SetTarget, TargetInstancesScope,
};

const DEFAULT_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_MAX_POLLS: u32 = 150;

/// Options for configuring a `GceCompute`.
#[derive(Clone, Debug)]
pub struct GceComputeOptions {
    /// Authorized HTTP client.
    pub client: GoogleClient,

    /// Project that owns the cluster.
    pub project: String,

    /// Region the cluster runs in.
    pub region: String,
}

/// Compute Engine backend.
#[derive(Clone, Debug)]
pub struct GceCompute {
    base_url: String,
    client: GoogleClient,
    max_polls: u32,
    poll_interval: Duration,
    project: String,
    region: String,
}

impl GceCompute {
    /// Creates a backend talking to the public Compute Engine endpoint.
    #[must_use]
    pub fn new(
        GceComputeOptions {
            client,
            project,
            region,
        }: GceComputeOptions,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
            max_polls: DEFAULT_MAX_POLLS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            project,
            region,
        }
    }

    /// Overrides the API endpoint.
    #[must_use]
    pub fn with_base_url<U: Into<String>>(mut self, base_url: U) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides how operations are polled.
    #[must_use]
    pub const fn with_polling(mut self, interval: Duration, max_polls: u32) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls;
        self
    }

    fn project_url(&self) -> String {
        format!("{}/projects/{}", self.base_url, self.project)
    }

    fn zone_url(&self, zone: &str) -> String {
        format!("{}/zones/{zone}", self.project_url())
    }

    fn region_url(&self) -> String {
        format!("{}/regions/{}", self.project_url(), self.region)
    }

    fn in_region(&self, scope: &str) -> bool {
        scope
            .strip_prefix("zones/")
            .and_then(|zone| region_from_zone(zone).ok())
            .is_some_and(|region| region == self.region)
    }

    async fn fetch_pages<P>(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<P>>
    where
        P: DeserializeOwned + Paged,
    {
        let mut pages = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut builder = self.client.request(method.clone(), url).await?.query(query);
            if let Some(token) = &token {
                builder = builder.query(&[("pageToken", token)]);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let page: P = self.client.execute(builder).await?.json().await?;
            token = page.next_page_token().map(ToString::to_string);
            pages.push(page);

            if token.is_none() {
                return Ok(pages);
            }
        }
    }

    async fn mutate<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<()> {
        let operation: Operation = self.client.send_json(Method::POST, url, body).await?;
        self.wait_for(operation).await
    }

    async fn wait_for(&self, mut operation: Operation) -> Result<()> {
        let mut polls = 0;

        while !operation.is_done() {
            if polls >= self.max_polls {
                return Err(Error::OperationTimeout(operation.name));
            }
            polls += 1;

            tokio::time::sleep(self.poll_interval).await;
            debug!("polling operation {} ({})", operation.name, operation.status);
            operation = self.client.get_json(&operation.self_link).await?;
        }

        match operation.error.and_then(|e| e.errors.into_iter().next()) {
            Some(detail) => Err(Error::OperationFailed {
                name: operation.name,
                code: detail.code,
                message: detail.message,
            }),
            None => Ok(()),
        }
    }
}

impl ComputeBackend for GceCompute {
    type Error = Error;
}

#[async_trait]
impl ComputeInventory for GceCompute {
    async fn list_group_instances(&self, group: &str) -> Result<Vec<GroupMember>> {
        let url = format!("{}/instanceGroups/{group}/listInstances", self.region_url());
        let body = serde_json::json!({ "instanceState": "ALL" });
        let pages: Vec<List<GroupInstance>> = self
            .fetch_pages(Method::POST, &url, &[], Some(&body))
            .await?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.items)
            .map(Into::into)
            .collect())
    }

    async fn get_instance(&self, zone: &str, name: &str) -> Result<Vm> {
        let url = format!("{}/instances/{name}", self.zone_url(zone));
        let instance: Instance = self.client.get_json(&url).await?;

        Ok(instance.into())
    }

    async fn list_instances_by_label(&self, key: &str, value: &str) -> Result<Vec<Vm>> {
        let url = format!("{}/aggregated/instances", self.project_url());
        let filter = format!("labels.{key}={value}");
        let pages: Vec<AggregatedList<InstancesScope>> = self
            .fetch_pages(Method::GET, &url, &[("filter", filter.as_str())], None)
            .await?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.items)
            .filter(|(scope, _)| self.in_region(scope))
            .flat_map(|(_, scope)| scope.instances)
            .map(Into::into)
            .collect())
    }

    async fn set_labels(&self, vm: &Vm, labels: BTreeMap<String, String>) -> Result<()> {
        let url = format!("{}/instances/{}/setLabels", self.zone_url(&vm.zone), vm.name);
        let body = SetLabels {
            labels: &labels,
            label_fingerprint: vm.label_fingerprint.as_deref(),
        };

        self.mutate(&url, &body).await
    }
}

#[async_trait]
impl NetworkControl for GceCompute {
    async fn update_network_interface(
        &self,
        zone: &str,
        instance: &str,
        nic: &NetworkInterface,
    ) -> Result<()> {
        let url = format!(
            "{}/instances/{instance}/updateNetworkInterface?networkInterface={}",
            self.zone_url(zone),
            nic.name
        );
        let body = NicUpdate {
            alias_ip_ranges: &nic.alias_ip_ranges,
            fingerprint: nic.fingerprint.as_deref(),
        };

        info!(
            "updating {instance}/{} with {} alias ranges",
            nic.name,
            nic.alias_ip_ranges.len()
        );
        let operation: Operation = self.client.send_json(Method::PATCH, &url, &body).await?;

        self.wait_for(operation).await
    }

    async fn set_forwarding_rule_target(
        &self,
        rule: &ForwardingRule,
        target_self_link: &str,
    ) -> Result<()> {
        let region = if rule.region.is_empty() {
            self.region.as_str()
        } else {
            last_segment(&rule.region)
        };
        let url = format!(
            "{}/regions/{region}/forwardingRules/{}/setTarget",
            self.project_url(),
            rule.name
        );

        info!("pointing forwarding rule {} at {target_self_link}", rule.name);
        self.mutate(
            &url,
            &SetTarget {
                target: target_self_link,
            },
        )
        .await
    }

    async fn list_forwarding_rules(&self) -> Result<Vec<ForwardingRule>> {
        let url = format!("{}/forwardingRules", self.region_url());
        let pages: Vec<List<wire::ForwardingRuleResource>> =
            self.fetch_pages(Method::GET, &url, &[], None).await?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.items)
            .map(Into::into)
            .collect())
    }

    async fn list_target_instances(&self) -> Result<Vec<TargetInstance>> {
        let url = format!("{}/aggregated/targetInstances", self.project_url());
        let pages: Vec<AggregatedList<TargetInstancesScope>> =
            self.fetch_pages(Method::GET, &url, &[], None).await?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.items)
            .filter(|(scope, _)| self.in_region(scope))
            .flat_map(|(_, scope)| scope.target_instances)
            .map(Into::into)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::extract::{Path, Query};
    use axum::routing::{get, patch, post};
    use axum::{Json, Router};
    use halyard_compute::{AliasIpRange, ComputeError, ComputeErrorKind, VmStatus};
    use halyard_metadata::StaticTokenSource;
    use serde_json::{Value, json};

    async fn bind() -> (tokio::net::TcpListener, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        (listener, base)
    }

    fn compute(base: &str) -> GceCompute {
        let client = GoogleClient::new(Arc::new(StaticTokenSource::new("tok"))).unwrap();
        GceCompute::new(GceComputeOptions {
            client,
            project: "p".to_string(),
            region: "us-west1".to_string(),
        })
        .with_base_url(base)
        .with_polling(Duration::from_millis(1), 5)
    }

    #[tokio::test]
    async fn test_list_group_instances() {
        let (listener, base) = bind().await;
        let app = Router::new().route(
            "/projects/p/regions/us-west1/instanceGroups/{group}/listInstances",
            post(|Path(group): Path<String>| async move {
                assert_eq!(group, "bigip-group");
                Json(json!({
                    "items": [
                        {"instance": "https://x/projects/p/zones/us-west1-a/instances/a", "status": "RUNNING"},
                        {"instance": "https://x/projects/p/zones/us-west1-b/instances/b", "status": "TERMINATED"}
                    ]
                }))
            }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await });

        let members = compute(&base).list_group_instances("bigip-group").await.unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].zone, "us-west1-a");
        assert!(members[0].status.is_alive());
        assert_eq!(members[1].status, VmStatus::Terminated);
    }

    #[tokio::test]
    async fn test_label_query_stays_in_region() {
        let (listener, base) = bind().await;
        let app = Router::new().route(
            "/projects/p/aggregated/instances",
            get(|Query(query): Query<BTreeMap<String, String>>| async move {
                assert_eq!(query.get("filter").map(String::as_str), Some("labels.ha=external"));
                Json(json!({
                    "items": {
                        "zones/us-west1-a": {"instances": [{"name": "ext-1", "zone": "zones/us-west1-a"}]},
                        "zones/us-east1-b": {"instances": [{"name": "ext-2", "zone": "zones/us-east1-b"}]},
                        "zones/us-west1-c": {"warning": {"code": "NO_RESULTS_ON_PAGE"}}
                    }
                }))
            }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await });

        let vms = compute(&base)
            .list_instances_by_label("ha", "external")
            .await
            .unwrap();

        assert_eq!(vms.len(), 1);
        assert_eq!(vms[0].name, "ext-1");
        assert_eq!(vms[0].zone, "us-west1-a");
    }

    #[tokio::test]
    async fn test_nic_update_waits_for_operation() {
        let (listener, base) = bind().await;
        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        let self_link = format!("{base}/projects/p/zones/us-west1-a/operations/op-1");

        let app = Router::new()
            .route(
                "/projects/p/zones/us-west1-a/instances/{name}/updateNetworkInterface",
                patch(
                    move |Query(query): Query<BTreeMap<String, String>>, Json(body): Json<Value>| {
                        let self_link = self_link.clone();
                        async move {
                            assert_eq!(query.get("networkInterface").map(String::as_str), Some("nic0"));
                            assert_eq!(body["aliasIpRanges"][0]["ipCidrRange"], "10.0.5.1/32");
                            assert_eq!(body["fingerprint"], "fp=");
                            Json(json!({"name": "op-1", "status": "RUNNING", "selfLink": self_link}))
                        }
                    },
                ),
            )
            .route(
                "/projects/p/zones/us-west1-a/operations/{op}",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Json(json!({"name": "op-1", "status": "DONE"}))
                    }
                }),
            );
        tokio::spawn(async move { axum::serve(listener, app).await });

        let nic = NetworkInterface {
            name: "nic0".to_string(),
            alias_ip_ranges: vec![AliasIpRange::new("10.0.5.1/32")],
            fingerprint: Some("fp=".to_string()),
            ..NetworkInterface::default()
        };
        compute(&base)
            .update_network_interface("us-west1-a", "bigip-1", &nic)
            .await
            .unwrap();

        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_operation_is_reported() {
        let (listener, base) = bind().await;
        let app = Router::new().route(
            "/projects/p/regions/us-west1/forwardingRules/{rule}/setTarget",
            post(|| async {
                Json(json!({
                    "name": "op-2",
                    "status": "DONE",
                    "error": {"errors": [{"code": "RESOURCE_NOT_READY", "message": "busy"}]}
                }))
            }),
        );
        tokio::spawn(async move { axum::serve(listener, app).await });

        let rule = ForwardingRule {
            name: "fr-1".to_string(),
            region: "https://x/projects/p/regions/us-west1".to_string(),
            ..ForwardingRule::default()
        };
        let err = compute(&base)
            .set_forwarding_rule_target(&rule, "https://x/targetInstances/t1")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::OperationFailed { .. }));
        assert_eq!(err.kind(), ComputeErrorKind::NotReady);
    }

    #[tokio::test]
    async fn test_missing_instance_is_not_found() {
        let (listener, base) = bind().await;
        tokio::spawn(async move { axum::serve(listener, Router::new()).await });

        let err = compute(&base)
            .get_instance("us-west1-a", "gone")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ComputeErrorKind::NotFound);
    }
}
