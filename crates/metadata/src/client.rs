use std::fmt::{self, Debug};
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::trace;

use crate::{Error, Result, TokenSource};

/// Remote calls give up after this long instead of hanging the caller.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client that authorizes every request with a bearer token.
#[derive(Clone)]
pub struct GoogleClient {
    client: Client,
    tokens: Arc<dyn TokenSource>,
}

impl Debug for GoogleClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleClient").finish_non_exhaustive()
    }
}

impl GoogleClient {
    /// Creates a client using `tokens` for authorization.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self { client, tokens })
    }

    /// Starts an authorized request.
    ///
    /// # Errors
    ///
    /// Returns an error if no token can be obtained.
    pub async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self.tokens.token().await?;

        Ok(self.client.request(method, url).bearer_auth(token))
    }

    /// Sends a request and turns non-success statuses into `Error::Status`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the status is not 2xx.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let request = builder.build()?;
        let method = request.method().to_string();
        let url = request.url().to_string();

        trace!("{method} {url}");
        let response = self.client.execute(request).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();

        Err(Error::Status {
            method,
            url,
            status: status.as_u16(),
            body,
        })
    }

    /// Authorized GET, decoding a JSON response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let builder = self.request(Method::GET, url).await?;
        let response = self.execute(builder).await?;

        Ok(response.json().await?)
    }

    /// Authorized request with a JSON body, decoding a JSON response.
    ///
    /// Empty response bodies decode as JSON `null`, so `T` may be `()` or an
    /// `Option`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the body does not decode.
    pub async fn send_json<B, T>(&self, method: Method, url: &str, body: &B) -> Result<T>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.request(method, url).await?.json(body);
        let response = self.execute(builder).await?;
        let bytes = response.bytes().await?;

        if bytes.is_empty() {
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}
