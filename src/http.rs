//! HTTP client for the advising REST API
//!
//! This module wraps `reqwest` with the retry executor:
//! - JSON content type on every request, JSON bodies for POST/PUT/PATCH
//! - Bearer token injection from a pluggable credential source
//! - Automatic retries with exponential backoff on retryable statuses
//! - Per-request retry overrides, observers and cancellation
//!
//! Error responses that are not retryable are returned as responses; only
//! transport failures, exhausted retries and cancellation become errors.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::{Anonymous, CredentialProvider};
use crate::error::ClientError;
use crate::policy::{should_retry, Classify};
use crate::retry::{Retry, RetryConfig, RetryObserver};

/// Retrying HTTP client bound to one API base URL
///
/// # Examples
///
/// ```no_run
/// use advisor_client::credentials::SharedToken;
/// use advisor_client::http::ApiClient;
/// use serde_json::json;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), advisor_client::error::ClientError> {
/// let client = ApiClient::new("http://localhost:5000", Duration::from_secs(10))?
///     .with_credentials(Arc::new(SharedToken::new("abc123")));
///
/// let programmes = client.get("/api/programmes").send_json().await?;
/// let reply = client
///     .post("/api/chat", &json!({ "message": "Which programmes suit me?" }))
///     .send()
///     .await?;
/// println!("{:?} {}", programmes, reply.status());
/// # Ok(())
/// # }
/// ```
pub struct ApiClient {
    client: Client,
    base_url: String,
    retry_config: RetryConfig,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    /// Creates a client with pooled connections and the default retry policy
    ///
    /// # Arguments
    /// * `base_url` - Prefix prepended verbatim to every request path
    /// * `timeout` - Per-attempt request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let base_url = base_url.into();
        let client = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("advisor-client/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|source| ClientError::Transport {
                url: base_url.clone(),
                source,
            })?;

        Ok(Self {
            client,
            base_url,
            retry_config: RetryConfig::default(),
            credentials: Arc::new(Anonymous),
        })
    }

    /// Sets the retry configuration used when a request has no override
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    /// Sets where bearer tokens come from
    pub fn with_credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// Starts a request with an arbitrary method and no body
    pub fn request(&self, method: Method, path: &str) -> ApiRequest<'_> {
        ApiRequest {
            client: self,
            method,
            url: format!("{}{}", self.base_url, path),
            headers: HeaderMap::new(),
            body: Ok(None),
            retry_config: None,
            observer: None,
            cancel: None,
            seed: None,
        }
    }

    pub fn get(&self, path: &str) -> ApiRequest<'_> {
        self.request(Method::GET, path)
    }

    /// GET with fewer, slower retries, for requests a user is waiting on
    pub fn get_conservative(&self, path: &str) -> ApiRequest<'_> {
        self.get(path).retry_config(RetryConfig::conservative())
    }

    pub fn delete(&self, path: &str) -> ApiRequest<'_> {
        self.request(Method::DELETE, path)
    }

    pub fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiRequest<'_> {
        self.request(Method::POST, path).json(body)
    }

    pub fn put<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiRequest<'_> {
        self.request(Method::PUT, path).json(body)
    }

    pub fn patch<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> ApiRequest<'_> {
        self.request(Method::PATCH, path).json(body)
    }
}

/// A request being prepared by [`ApiClient`]
///
/// Nothing is sent until [`send`](ApiRequest::send) or
/// [`send_json`](ApiRequest::send_json) is awaited.
pub struct ApiRequest<'a> {
    client: &'a ApiClient,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Result<Option<Vec<u8>>, serde_json::Error>,
    retry_config: Option<RetryConfig>,
    observer: Option<&'a dyn RetryObserver<ClientError>>,
    cancel: Option<CancellationToken>,
    seed: Option<u64>,
}

impl<'a> ApiRequest<'a> {
    /// Serializes `body` as the JSON request body; a JSON `null` sends no body
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Self {
        self.body = serde_json::to_vec(body).map(|bytes| (bytes != b"null").then_some(bytes));
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Overrides the client's retry configuration for this request
    pub fn retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = Some(config);
        self
    }

    pub fn observer(mut self, observer: &'a dyn RetryObserver<ClientError>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Seeds the backoff jitter for reproducible delays
    pub fn jitter_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Sends the request, retrying retryable failures, and returns the raw response
    ///
    /// # Returns
    /// * `Ok(Response)` - Any response that is successful or not retryable
    /// * `Err(ClientError)` - Transport failure, exhausted retries, cancellation,
    ///   or a body that could not be encoded
    pub async fn send(self) -> Result<Response, ClientError> {
        let ApiRequest {
            client,
            method,
            url,
            mut headers,
            body,
            retry_config,
            observer,
            cancel,
            seed,
        } = self;

        let body = body?;
        let config = match &retry_config {
            Some(config) => config,
            None => &client.retry_config,
        };
        config.validate()?;

        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static("application/json"));
        let token = client.credentials.bearer_token();
        if token.is_none() {
            debug!("No bearer token available, sending {} {} unauthenticated", method, url);
        }

        let mut retry = Retry::new(config);
        if let Some(observer) = observer {
            retry = retry.observer(observer);
        }
        if let Some(token) = cancel {
            retry = retry.cancel_on(token);
        }
        if let Some(seed) = seed {
            retry = retry.seed(seed);
        }

        let http = &client.client;
        let method_ref = &method;
        let url_ref = url.as_str();
        let headers_ref = &headers;
        let token_ref = token.as_deref();
        let body_ref = body.as_deref();

        let response = retry
            .run(move || {
                let mut builder = http
                    .request(method_ref.clone(), url_ref)
                    .headers(headers_ref.clone());
                if let Some(token) = token_ref {
                    builder = builder.bearer_auth(token);
                }
                if let Some(body) = body_ref {
                    builder = builder.body(body.to_vec());
                }

                async move {
                    let response = builder.send().await.map_err(|source| ClientError::Transport {
                        url: url_ref.to_string(),
                        source,
                    })?;

                    let status = response.status();
                    if !status.is_success() && should_retry(status.failure(), config) {
                        return Err(ClientError::Status {
                            status,
                            url: url_ref.to_string(),
                        });
                    }
                    Ok::<_, ClientError>(response)
                }
            })
            .await?;

        if !response.status().is_success() {
            info!("{} {} returned non-retriable status {}", method, url, response.status());
        }
        Ok(response)
    }

    /// Sends the request and decodes the body leniently
    ///
    /// JSON content types are parsed as JSON, anything else is read as text.
    /// A body that cannot be read or parsed yields `Ok(None)` rather than an
    /// error.
    pub async fn send_json(self) -> Result<Option<Payload>, ClientError> {
        let response = self.send().await?;
        Ok(Payload::from_response(response).await)
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Text(String),
}

impl Payload {
    /// Reads and decodes a response body, logging instead of failing
    pub async fn from_response(response: Response) -> Option<Payload> {
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        if is_json {
            let bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!("Failed to read response body: {}", err);
                    return None;
                }
            };
            match serde_json::from_slice(&bytes) {
                Ok(value) => Some(Payload::Json(value)),
                Err(err) => {
                    warn!("Failed to parse response as JSON: {}", err);
                    None
                }
            }
        } else {
            match response.text().await {
                Ok(text) => Some(Payload::Text(text)),
                Err(err) => {
                    warn!("Failed to read response body: {}", err);
                    None
                }
            }
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            Payload::Json(_) => None,
        }
    }

    /// Deserializes a JSON payload into `T`; text or mismatched JSON yields `None`
    pub fn deserialize<T: DeserializeOwned>(self) -> Option<T> {
        match self {
            Payload::Json(value) => serde_json::from_value(value).ok(),
            Payload::Text(_) => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Json(value) => match serde_json::to_string_pretty(value) {
                Ok(pretty) => f.write_str(&pretty),
                Err(_) => write!(f, "{}", value),
            },
            Payload::Text(text) => f.write_str(text),
        }
    }
}
