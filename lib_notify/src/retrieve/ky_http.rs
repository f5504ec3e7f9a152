//! # HTTP Retrieval Utilities
//!
//! An asynchronous client wrapper around `reqwest`. It serves both directions
//! of the engine: reading the notice page as text, with exponential backoff
//! retries, and posting delivery payloads as JSON exactly once. A delivery
//! that timed out may still have been accepted, so posts are never replayed.

use std::time::Duration;

use reqwest::{header::CONTENT_TYPE, Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Serialize;

const USER_AGENT: &str = concat!("NoticeWatch/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_RETRIES: u32 = 3;

/// A standardized container for API responses.
///
/// Non-2xx statuses are not errors at this level: they come back with
/// `success == false` and the raw body in `error_body`.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully decoded response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
}

/// An asynchronous HTTP client bound to a base URL.
pub struct ApiClient {
    /// Client with the retry middleware, used for idempotent reads.
    inner: ClientWithMiddleware,
    /// Same connection pool without retries, used for posts.
    single_shot: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient` with a timeout. Reads get a three-retry
    /// backoff policy; posts are sent once.
    ///
    /// # Errors
    /// Fails when `base_url` is not an absolute URL or the TLS backend cannot
    /// be initialised.
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url)?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
        let single_shot = ClientBuilder::new(http.clone()).build();
        let inner = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner,
            single_shot,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetches a page as text. An empty `path` fetches the base URL itself.
    pub async fn fetch_text(&self, path: &str) -> anyhow::Result<ApiResponse<String>> {
        let url = self.base_url.join(path)?;
        let response = self.inner.request(Method::GET, url).send().await?;
        let status = response.status();
        let text = response.text().await?;

        let success = status.is_success();
        Ok(ApiResponse {
            data: success.then(|| text.clone()),
            error_body: (!success).then_some(text),
            status: status.as_u16(),
            success,
        })
    }

    /// Posts `body` as JSON to an absolute URL and discards any success body.
    ///
    /// Used for webhooks, which often answer `204 No Content`. The request is
    /// never retried: a 5xx or a timeout is reported to the caller as is.
    pub async fn post_json<B>(&self, url: Url, body: &B) -> anyhow::Result<ApiResponse<()>>
    where
        B: Serialize,
    {
        let json_body = serde_json::to_string(body)?;
        let response = self
            .single_shot
            .request(Method::POST, url)
            .header(CONTENT_TYPE, "application/json")
            .body(json_body)
            .send()
            .await?;

        let status = response.status();
        let success = status.is_success();
        let error_body = if success { None } else { response.text().await.ok() };

        Ok(ApiResponse {
            data: success.then_some(()),
            error_body,
            status: status.as_u16(),
            success,
        })
    }
}
