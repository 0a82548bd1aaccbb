//! Fetch strategy resolution: direct request first, public relays as best-effort fallback.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use jobfeed_core::ErrorKind;
use reqwest::header::{HeaderName, HeaderValue, CACHE_CONTROL};
use reqwest::Method;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, info_span, warn, Instrument};

pub use reqwest::StatusCode;

pub const CRATE_NAME: &str = "jobfeed-http";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    #[default]
    Default,
    /// Ask every hop not to serve or keep a cached copy.
    NoStore,
}

/// Method, headers and cache policy shared by every strategy for one request.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: Vec<(String, String)>,
    pub cache: CachePolicy,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            headers: Vec::new(),
            cache: CachePolicy::Default,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("access denied by upstream (http {status}) for {url}; check the API token")]
    Auth { status: u16, url: String },
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("response from {url} is not valid JSON: {message}")]
    Decode { url: String, message: String },
    #[error("all connection attempts failed (direct and relays)")]
    Unreachable,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::Auth { .. } => ErrorKind::Auth,
            FetchError::Status { .. } => ErrorKind::Http,
            FetchError::Transport { .. } => ErrorKind::Network,
            FetchError::Decode { .. } => ErrorKind::MalformedPayload,
            FetchError::Unreachable => ErrorKind::Unreachable,
        }
    }
}

/// Seam between strategy resolution and the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, url: &str, options: &RequestOptions) -> Result<TransportResponse, FetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct HttpClientConfig {
    /// `None` leaves the transport default in place.
    pub timeout: Option<Duration>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().gzip(true).brotli(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, url: &str, options: &RequestOptions) -> Result<TransportResponse, FetchError> {
        let transport_err = |err: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: err.to_string(),
        };

        let mut request = self.client.request(options.method.clone(), url);
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: format!("invalid header name {name}: {e}"),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| FetchError::Transport {
                url: url.to_string(),
                message: format!("invalid value for header {name}: {e}"),
            })?;
            request = request.header(name, value);
        }
        if options.cache == CachePolicy::NoStore && options.header_value("cache-control").is_none() {
            request = request.header(CACHE_CONTROL, "no-store");
        }

        let resp = request.send().await.map_err(transport_err)?;
        let status = resp.status();
        let final_url = resp.url().to_string();
        let body = resp.bytes().await.map_err(transport_err)?.to_vec();
        Ok(TransportResponse {
            status,
            final_url,
            body,
        })
    }
}

/// URL-rewriting relay that wraps the target URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayTemplate {
    /// `{prefix}{percent-encoded target}`
    EncodedQuery { prefix: String },
    /// `{prefix}{target}` verbatim
    RawPath { prefix: String },
}

impl RelayTemplate {
    pub fn wrap(&self, target: &str) -> String {
        match self {
            RelayTemplate::EncodedQuery { prefix } => {
                let encoded: String = url::form_urlencoded::byte_serialize(target.as_bytes()).collect();
                format!("{prefix}{encoded}")
            }
            RelayTemplate::RawPath { prefix } => format!("{prefix}{target}"),
        }
    }
}

/// The two public relays, in the order they are tried.
pub fn default_relays() -> Vec<RelayTemplate> {
    vec![
        RelayTemplate::EncodedQuery {
            prefix: "https://corsproxy.io/?".to_string(),
        },
        RelayTemplate::RawPath {
            prefix: "https://thingproxy.freeboard.io/fetch/".to_string(),
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Direct,
    Relay(RelayTemplate),
}

impl Strategy {
    fn request_url(&self, target: &str) -> String {
        match self {
            Strategy::Direct => target.to_string(),
            Strategy::Relay(template) => template.wrap(target),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Relay(RelayTemplate::EncodedQuery { .. }) => "relay:encoded-query",
            Strategy::Relay(RelayTemplate::RawPath { .. }) => "relay:raw-path",
        }
    }
}

enum Attempt {
    Success(JsonValue),
    Abort(FetchError),
    FallThrough(FetchError),
}

/// Stateless resolver; tries each strategy in order and returns the first JSON payload.
#[derive(Clone)]
pub struct FetchStrategyResolver {
    transport: Arc<dyn Transport>,
    strategies: Vec<Strategy>,
}

impl FetchStrategyResolver {
    /// Direct attempt followed by [`default_relays`].
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_relays(transport, default_relays())
    }

    pub fn with_relays(transport: Arc<dyn Transport>, relays: Vec<RelayTemplate>) -> Self {
        let strategies = std::iter::once(Strategy::Direct)
            .chain(relays.into_iter().map(Strategy::Relay))
            .collect();
        Self {
            transport,
            strategies,
        }
    }

    pub fn direct_only(transport: Arc<dyn Transport>) -> Self {
        Self::with_relays(transport, Vec::new())
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    pub async fn resolve(&self, url: &str, options: &RequestOptions) -> Result<JsonValue, FetchError> {
        let span = info_span!("resolve", url);
        async {
            let mut last_error = None;
            for strategy in &self.strategies {
                match self.attempt(strategy, url, options).await {
                    Attempt::Success(payload) => return Ok(payload),
                    Attempt::Abort(err) => return Err(err),
                    Attempt::FallThrough(err) => {
                        warn!(strategy = strategy.label(), error = %err, "fetch strategy failed");
                        last_error = Some(err);
                    }
                }
            }
            Err(last_error.unwrap_or(FetchError::Unreachable))
        }
        .instrument(span)
        .await
    }

    async fn attempt(&self, strategy: &Strategy, url: &str, options: &RequestOptions) -> Attempt {
        let request_url = strategy.request_url(url);
        debug!(strategy = strategy.label(), "sending request");

        let resp = match self.transport.send(&request_url, options).await {
            Ok(resp) => resp,
            Err(err) => return Attempt::FallThrough(err),
        };

        if resp.status.is_success() {
            return match serde_json::from_slice(&resp.body) {
                Ok(payload) => Attempt::Success(payload),
                Err(err) => Attempt::FallThrough(FetchError::Decode {
                    url: resp.final_url,
                    message: err.to_string(),
                }),
            };
        }

        let is_auth = matches!(resp.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN);
        match strategy {
            Strategy::Direct if is_auth => Attempt::Abort(FetchError::Auth {
                status: resp.status.as_u16(),
                url: resp.final_url,
            }),
            _ => Attempt::FallThrough(FetchError::Status {
                status: resp.status.as_u16(),
                url: resp.final_url,
            }),
        }
    }
}
