//! `ApplianceState` over the device's iControl REST API.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use halyard_failover::{ApplianceState, FailoverState, TrafficGroupStatus, VirtualAddress};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

/// Local management address of the device.
pub const DEFAULT_BASE_URL: &str = "https://localhost";

const TRAFFIC_GROUP_STATS_PATH: &str = "/mgmt/tm/cm/traffic-group/stats";
const VIRTUAL_ADDRESS_PATH: &str = "/mgmt/tm/ltm/virtual-address";
const DEVICE_PATH: &str = "/mgmt/tm/cm/device";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for creating a new `IControlAppliance`.
#[derive(Clone, Debug)]
pub struct IControlApplianceOptions {
    /// Scheme and authority of the management interface.
    pub base_url: String,

    /// Admin user name.
    pub username: String,

    /// Admin password.
    pub password: String,

    /// Accept the device's self-signed certificate.
    pub accept_invalid_certs: bool,
}

/// Reads failover state from the device's REST API with basic auth.
#[derive(Clone)]
pub struct IControlAppliance {
    base_url: String,
    client: Client,
    password: String,
    username: String,
}

impl std::fmt::Debug for IControlAppliance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IControlAppliance")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl IControlAppliance {
    /// Creates a new `IControlAppliance`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        IControlApplianceOptions {
            base_url,
            username,
            password,
            accept_invalid_certs,
        }: IControlApplianceOptions,
    ) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            password,
            username,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = format!("{}{path}", self.base_url);
        trace!("GET {url}");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response.json().await?)
    }
}

#[derive(Deserialize)]
struct Items<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Deserialize)]
struct Stats {
    #[serde(default)]
    entries: BTreeMap<String, StatsEntry>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsEntry {
    nested_stats: NestedStats,
}

#[derive(Deserialize)]
struct NestedStats {
    entries: BTreeMap<String, StatValue>,
}

#[derive(Deserialize)]
struct StatValue {
    #[serde(default)]
    description: Option<String>,
}

impl NestedStats {
    fn description(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .and_then(|value| value.description.as_deref())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VirtualAddressItem {
    address: String,
    #[serde(default)]
    traffic_group: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeviceItem {
    name: String,
    #[serde(default)]
    full_path: Option<String>,
    #[serde(default)]
    self_device: Option<String>,
}

#[async_trait]
impl ApplianceState for IControlAppliance {
    type Error = Error;

    async fn traffic_group_status(&self) -> Result<Vec<TrafficGroupStatus>, Error> {
        let stats: Stats = self.get(TRAFFIC_GROUP_STATS_PATH).await?;

        Ok(stats
            .entries
            .into_values()
            .filter_map(|entry| {
                let stats = entry.nested_stats;
                Some(TrafficGroupStatus {
                    traffic_group: stats.description("trafficGroup")?.to_string(),
                    device_name: stats.description("deviceName")?.to_string(),
                    state: FailoverState::from_api(stats.description("failoverState")?),
                })
            })
            .collect())
    }

    async fn virtual_addresses(&self) -> Result<Vec<VirtualAddress>, Error> {
        let addresses: Items<VirtualAddressItem> = self.get(VIRTUAL_ADDRESS_PATH).await?;

        Ok(addresses
            .items
            .into_iter()
            .filter_map(|item| match item.traffic_group {
                Some(traffic_group) => Some(VirtualAddress {
                    address: item.address,
                    traffic_group,
                }),
                None => {
                    debug!("{} floats with no traffic group", item.address);
                    None
                }
            })
            .collect())
    }

    async fn local_device_name(&self) -> Result<String, Error> {
        let devices: Items<DeviceItem> = self.get(DEVICE_PATH).await?;

        devices
            .items
            .into_iter()
            .find(|device| device.self_device.as_deref() == Some("true"))
            .map(|device| device.full_path.unwrap_or(device.name))
            .ok_or(Error::NoSelfDevice)
    }
}
