use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::token::AccessToken;
use crate::{Error, Result};

static METADATA_BASE_URL: &str = "http://metadata.google.internal/computeMetadata/v1";
static PROJECT_ID_PATH: &str = "/project/project-id";
static INSTANCE_NAME_PATH: &str = "/instance/name";
static INSTANCE_ZONE_PATH: &str = "/instance/zone";
static TOKEN_PATH: &str = "/instance/service-accounts/default/token";

const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Client for the Compute Engine metadata server.
#[derive(Clone, Debug)]
pub struct MetadataClient {
    base_url: String,
    client: Client,
}

impl Default for MetadataClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataClient {
    /// Creates a client for the well-known metadata endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_url(METADATA_BASE_URL)
    }

    /// Creates a client against a different base URL (emulators, tests).
    #[must_use]
    pub fn with_base_url<U: Into<String>>(base_url: U) -> Self {
        let client = Client::builder()
            .timeout(METADATA_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// The project the VM belongs to.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata request fails.
    pub async fn project_id(&self) -> Result<String> {
        self.get_from_endpoint(PROJECT_ID_PATH).await
    }

    /// The VM's instance name.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata request fails.
    pub async fn instance_name(&self) -> Result<String> {
        self.get_from_endpoint(INSTANCE_NAME_PATH).await
    }

    /// The VM's zone in short form, e.g. `us-west1-a`.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata request fails or the zone is malformed.
    pub async fn zone(&self) -> Result<String> {
        let path = self.get_from_endpoint(INSTANCE_ZONE_PATH).await?;
        zone_from_path(&path).map(String::from)
    }

    /// The VM's region, derived from its zone.
    ///
    /// # Errors
    ///
    /// Returns an error if the zone cannot be fetched or parsed.
    pub async fn region(&self) -> Result<String> {
        let zone = self.zone().await?;
        region_from_zone(&zone).map(String::from)
    }

    /// Fetches a fresh access token for the default service account.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn access_token(&self) -> Result<AccessToken> {
        let body = self.get_from_endpoint(TOKEN_PATH).await?;
        let response: TokenResponse = serde_json::from_str(&body)?;

        debug!("fetched access token valid for {}s", response.expires_in);

        Ok(AccessToken {
            token: response.access_token,
            expires_at: Instant::now() + Duration::from_secs(response.expires_in),
        })
    }

    async fn get_from_endpoint(&self, path: &str) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(Error::Status {
                method: "GET".to_string(),
                url,
                status: status.as_u16(),
                body,
            });
        }

        Ok(body.trim().to_string())
    }
}

/// Extracts the short zone name from `projects/<n>/zones/<zone>`.
///
/// # Errors
///
/// Returns `Error::InvalidZone` if the path has no zone segment.
pub fn zone_from_path(path: &str) -> Result<&str> {
    let zone = match path.split_once("zones/") {
        Some((_, zone)) => zone,
        None if !path.contains('/') => path,
        None => "",
    };

    if zone.is_empty() || zone.contains('/') {
        return Err(Error::InvalidZone(path.to_string()));
    }

    Ok(zone)
}

/// Drops the zone letter: `us-west1-a` becomes `us-west1`.
///
/// # Errors
///
/// Returns `Error::InvalidZone` if the zone has no `-<letter>` suffix.
pub fn region_from_zone(zone: &str) -> Result<&str> {
    zone.rsplit_once('-')
        .map(|(region, _)| region)
        .filter(|region| region.contains('-'))
        .ok_or_else(|| Error::InvalidZone(zone.to_string()))
}
