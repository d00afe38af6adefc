//! Sluice HTTP client implementation

use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use serde_json::Value;
use sluice_core::{DecoderConfig, SluiceError};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::dispatcher::{DispatchHooks, StreamDispatcher, StreamOutcome};
use crate::poller::StatusSource;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// Max idle connections per host
    pub pool_max_idle_per_host: usize,
    /// TCP connect timeout
    pub connect_timeout: Option<Duration>,
    /// Deadline for non-streaming requests, covering the whole exchange
    pub request_timeout: Option<Duration>,
    /// Frame decoding limits for streamed responses
    pub decoder: DecoderConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 8,
            connect_timeout: Some(Duration::from_secs(10)),
            request_timeout: Some(Duration::from_secs(10)),
            decoder: DecoderConfig::default(),
        }
    }
}

type HttpClient = Client<HttpConnector, Full<Bytes>>;

/// HTTP client for event streams and status polling
#[derive(Clone)]
pub struct SluiceClient {
    base_url: String,
    client: HttpClient,
    config: ClientConfig,
}

impl SluiceClient {
    /// Create a new client with the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_config(base_url, ClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(base_url: impl Into<String>, config: ClientConfig) -> Self {
        let client = Self::build_client(&config);
        Self {
            base_url: base_url.into(),
            client,
            config,
        }
    }

    /// Create a builder for configuring the client
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    fn build_client(config: &ClientConfig) -> HttpClient {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(config.connect_timeout);

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_idle_timeout(config.pool_idle_timeout.unwrap_or(Duration::from_secs(90)));
        builder.pool_max_idle_per_host(config.pool_max_idle_per_host);
        builder.build(connector)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Join the base URL and a path
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// POST a JSON request and return the streaming response unread.
    ///
    /// The status code is not checked here; [`StreamDispatcher::consume`]
    /// rejects non-success responses.
    #[instrument(skip(self, body), fields(http.url = %self.endpoint(path), otel.kind = "client"))]
    pub async fn open_stream(
        &self,
        path: &str,
        body: Bytes,
    ) -> Result<Response<Incoming>, SluiceError> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint(path))
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .header("Cache-Control", "no-cache")
            .body(Full::new(body))
            .map_err(|e| SluiceError::Transport(format!("Failed to build request: {}", e)))?;

        self.client
            .request(req)
            .await
            .map_err(|e| SluiceError::Transport(format!("Failed to send request: {}", e)))
    }

    /// Open a stream and dispatch its events to `hooks` until it ends.
    ///
    /// Failing to connect is reported through `on_error` like any other
    /// transport failure.
    pub async fn stream(
        &self,
        path: &str,
        body: Bytes,
        mut hooks: DispatchHooks<'_>,
        cancel: &CancellationToken,
    ) -> StreamOutcome {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
            response = self.open_stream(path, body) => response,
        };

        match response {
            Ok(response) => {
                StreamDispatcher::new(self.config.decoder)
                    .consume(response, hooks, cancel)
                    .await
            }
            Err(e) => {
                hooks.report_error(e);
                StreamOutcome::Failed
            }
        }
    }

    /// Status source polling `path` with this client's connection pool
    pub fn status_source(&self, path: &str) -> HttpStatusSource {
        HttpStatusSource {
            url: self.endpoint(path),
            client: self.client.clone(),
            timeout: self.config.request_timeout,
        }
    }
}

impl fmt::Debug for SluiceClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SluiceClient")
            .field("base_url", &self.base_url)
            .field("config", &self.config)
            .finish()
    }
}

/// Fetches status JSON over HTTP GET
#[derive(Clone)]
pub struct HttpStatusSource {
    url: String,
    client: HttpClient,
    timeout: Option<Duration>,
}

impl HttpStatusSource {
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn get(&self) -> Result<Value, SluiceError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange())
                .await
                .map_err(|_| SluiceError::Timeout(limit))?,
            None => self.exchange().await,
        }
    }

    async fn exchange(&self) -> Result<Value, SluiceError> {
        let req = Request::builder()
            .method(Method::GET)
            .uri(&self.url)
            .header("Accept", "application/json")
            .header("Cache-Control", "no-store")
            .body(Full::new(Bytes::new()))
            .map_err(|e| SluiceError::Transport(format!("Failed to build request: {}", e)))?;

        let resp = self
            .client
            .request(req)
            .await
            .map_err(|e| SluiceError::Transport(format!("Failed to send request: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SluiceError::Status(status.as_u16()));
        }

        let body_bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| SluiceError::Transport(format!("Failed to read response: {}", e)))?
            .to_bytes();

        serde_json::from_slice(&body_bytes).map_err(|e| SluiceError::Payload(e.to_string()))
    }
}

impl StatusSource for HttpStatusSource {
    #[instrument(skip(self, cancel), fields(http.url = %self.url, otel.kind = "client"))]
    async fn fetch_status(&self, cancel: CancellationToken) -> Result<Value, SluiceError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SluiceError::Cancelled),
            result = self.get() => result,
        }
    }
}

impl fmt::Debug for HttpStatusSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpStatusSource")
            .field("url", &self.url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Builder for configuring a Sluice client
#[derive(Debug, Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a new client builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base URL for the client
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set connection pool idle timeout
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set max idle connections per host
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Set the TCP connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    /// Set the deadline for non-streaming requests
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Set the largest frame a stream may buffer before failing
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.decoder = self.config.decoder.max_frame_size(size);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<SluiceClient, SluiceError> {
        let base_url = self
            .base_url
            .ok_or_else(|| SluiceError::Config("base_url is required".to_string()))?;

        let uri = base_url
            .parse::<http::Uri>()
            .map_err(|e| SluiceError::Config(format!("Invalid base URL {}: {}", base_url, e)))?;
        if uri.scheme().is_none() || uri.host().is_none() {
            return Err(SluiceError::Config(format!(
                "Invalid base URL {}: expected scheme and host",
                base_url
            )));
        }

        Ok(SluiceClient::with_config(base_url, self.config))
    }
}
