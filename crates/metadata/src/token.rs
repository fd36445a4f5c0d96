use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{MetadataClient, Result};

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// An OAuth bearer token and when it stops being valid.
#[derive(Clone, Debug)]
pub struct AccessToken {
    /// The bearer token.
    pub token: String,

    /// When the token expires.
    pub expires_at: Instant,
}

impl AccessToken {
    fn is_fresh(&self) -> bool {
        self.expires_at > Instant::now() + REFRESH_MARGIN
    }
}

/// Something that can hand out bearer tokens for Google APIs.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    /// Returns a token valid for at least a short while.
    async fn token(&self) -> Result<String>;
}

/// Token source backed by the metadata server's default service account.
///
/// The token is cached until shortly before it expires.
#[derive(Debug)]
pub struct MetadataTokenSource {
    cached: Mutex<Option<AccessToken>>,
    metadata: MetadataClient,
}

impl MetadataTokenSource {
    /// Creates a token source using `metadata`.
    #[must_use]
    pub const fn new(metadata: MetadataClient) -> Self {
        Self {
            cached: Mutex::const_new(None),
            metadata,
        }
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.token.clone());
        }

        debug!("refreshing access token from metadata server");
        let token = self.metadata.access_token().await?;
        let value = token.token.clone();
        *cached = Some(token);

        Ok(value)
    }
}

/// Token source for externally supplied credential material.
#[derive(Clone, Debug)]
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    /// Wraps a fixed bearer token.
    #[must_use]
    pub fn new<T: Into<String>>(token: T) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}
