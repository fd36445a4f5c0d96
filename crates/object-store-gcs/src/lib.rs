//! Implementation of the object store over the Cloud Storage JSON API.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use halyard_metadata::GoogleClient;
use halyard_object_store::{ContentType, ObjectInfo, ObjectStore, ObjectValue, parse_gs_uri};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::Method;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, trace};

const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com";

/// Options for configuring a `GcsObjectStore`.
#[derive(Clone, Debug)]
pub struct GcsObjectStoreOptions {
    /// Bucket holding the cluster's objects (must exist).
    pub bucket: String,

    /// Authorized HTTP client.
    pub client: GoogleClient,
}

/// Object store backed by a Cloud Storage bucket.
#[derive(Clone, Debug)]
pub struct GcsObjectStore {
    base_url: String,
    bucket: String,
    client: GoogleClient,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectResource {
    name: String,
    content_type: Option<String>,
    updated: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

fn encode_name(name: &str) -> String {
    utf8_percent_encode(name, NON_ALPHANUMERIC).to_string()
}

impl GcsObjectStore {
    /// Creates a new `GcsObjectStore`.
    #[must_use]
    pub fn new(GcsObjectStoreOptions { bucket, client }: GcsObjectStoreOptions) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            bucket,
            client,
        }
    }

    /// Overrides the API endpoint.
    #[must_use]
    pub fn with_base_url<U: Into<String>>(mut self, base_url: U) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Reads an object named by a `gs://bucket/key` URI, in any bucket the
    /// credentials can read.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI is invalid or the object cannot be read.
    pub async fn get_by_uri(&self, uri: &str) -> Result<ObjectValue, Error> {
        let uri = parse_gs_uri(uri)?;

        self.read(&uri.bucket, &uri.key).await
    }

    fn object_url(&self, bucket: &str, name: &str) -> String {
        format!(
            "{}/storage/v1/b/{bucket}/o/{}",
            self.base_url,
            encode_name(name)
        )
    }

    async fn read(&self, bucket: &str, name: &str) -> Result<ObjectValue, Error> {
        let url = self.object_url(bucket, name);

        let resource: ObjectResource = self.client.get_json(&url).await?;
        let content_type = ContentType::from_mime(resource.content_type.as_deref().unwrap_or(""));

        let builder = self
            .client
            .request(Method::GET, &url)
            .await?
            .query(&[("alt", "media")]);
        let bytes = self.client.execute(builder).await?.bytes().await?;
        trace!("read {} bytes from gs://{bucket}/{name}", bytes.len());

        Ok(ObjectValue::decode(bytes, content_type)?)
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    type Error = Error;

    async fn get<K>(&self, key: K) -> Result<ObjectValue, Self::Error>
    where
        K: Into<String> + Send,
    {
        self.read(&self.bucket, &key.into()).await
    }

    async fn put<K>(&self, key: K, value: ObjectValue) -> Result<(), Self::Error>
    where
        K: Into<String> + Send,
    {
        let key = key.into();
        let url = format!("{}/upload/storage/v1/b/{}/o", self.base_url, self.bucket);
        let body: Bytes = value.encode();

        let builder = self
            .client
            .request(Method::POST, &url)
            .await?
            .query(&[("uploadType", "media"), ("name", key.as_str())])
            .header(CONTENT_TYPE, value.content_type().as_mime())
            .body(body);
        self.client.execute(builder).await?;
        debug!("stored gs://{}/{key} as {}", self.bucket, value.content_type());

        Ok(())
    }

    async fn delete<K>(&self, key: K) -> Result<(), Self::Error>
    where
        K: Into<String> + Send,
    {
        let url = self.object_url(&self.bucket, &key.into());
        let builder = self.client.request(Method::DELETE, &url).await?;
        self.client.execute(builder).await?;

        Ok(())
    }

    async fn list_by_prefix<P>(&self, prefix: P) -> Result<Vec<ObjectInfo>, Self::Error>
    where
        P: Into<String> + Send,
    {
        let prefix = prefix.into();
        let url = format!("{}/storage/v1/b/{}/o", self.base_url, self.bucket);
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut builder = self
                .client
                .request(Method::GET, &url)
                .await?
                .query(&[("prefix", prefix.as_str())]);
            if let Some(token) = &page_token {
                builder = builder.query(&[("pageToken", token)]);
            }

            let page: ObjectList = self.client.execute(builder).await?.json().await?;
            objects.extend(page.items.into_iter().map(|item| ObjectInfo {
                name: item.name,
                updated_at: item.updated,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(objects),
            }
        }
    }
}
