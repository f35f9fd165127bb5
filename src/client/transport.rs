//! HTTP transport for the remote query endpoint.
//!
//! Queries are POSTed as JSON; the endpoint answers with either a `data`
//! key or an `errors` key. Response headers are captured so application
//! errors can be logged verbatim alongside them.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::{ClientConfig, TlsMode};

use super::{ClientError, ClientResult};

const KEEPALIVE_SECS: u64 = 45;

/// A decoded response: exactly one of `data` or `errors` is meaningful.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    pub data: Option<Value>,
    pub errors: Option<Value>,
    pub headers: BTreeMap<String, String>,
}

impl ResponseEnvelope {
    pub fn from_body(body: Value, headers: BTreeMap<String, String>) -> Self {
        let mut body = body;
        let data = body.get_mut("data").map(Value::take).filter(|v| !v.is_null());
        let errors = body.get_mut("errors").map(Value::take).filter(|v| !v.is_null());
        Self {
            data,
            errors,
            headers,
        }
    }

    /// Extract the payload, converting an `errors` envelope into the
    /// non-retryable application error carrying payload and headers. Both
    /// are logged verbatim here, on every path that decodes a response.
    pub fn into_data(self) -> ClientResult<Value> {
        if let Some(errors) = self.errors {
            error!(%errors, headers = ?self.headers, "endpoint returned application errors");
            return Err(ClientError::Query {
                errors,
                headers: self.headers,
            });
        }
        self.data
            .ok_or_else(|| ClientError::Parse("response carries neither data nor errors".into()))
    }
}

/// Seam between sessions and the wire, so fixture-backed tests can script
/// responses without a network.
#[async_trait]
pub trait QueryTransport: Send + Sync {
    async fn post(&self, query: &str) -> ClientResult<ResponseEnvelope>;
}

/// Asynchronous transport over reqwest.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = apply_config(reqwest::Client::builder(), config)?
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn post(&self, query: &str) -> ClientResult<ResponseEnvelope> {
        let correlation = Uuid::new_v4();
        debug!(%correlation, endpoint = %self.endpoint, "posting query");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .await
            .map_err(|e| {
                warn!(%correlation, "request failed: {}", e);
                ClientError::Transport(format!("request failed: {}", e))
            })?;

        let status = response.status();
        let headers = collect_headers(response.headers());
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%correlation, %status, "endpoint returned failure status");
            return Err(ClientError::Transport(format!(
                "request failed with status {}: {}",
                status, text
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ClientError::Parse(format!("invalid response body: {}", e)))?;
        debug!(%correlation, %status, "query answered");
        Ok(ResponseEnvelope::from_body(body, headers))
    }
}

/// Blocking transport for the synchronous client: fixed request timeout,
/// fixed attempt count.
pub struct BlockingTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
    max_attempts: u32,
}

impl BlockingTransport {
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let client = apply_blocking_config(reqwest::blocking::Client::builder(), config)?
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            max_attempts: config.limits.max_attempts.max(1),
        })
    }

    pub fn post(&self, query: &str) -> ClientResult<ResponseEnvelope> {
        let correlation = Uuid::new_v4();
        let mut attempt = 1;
        loop {
            debug!(%correlation, attempt, endpoint = %self.endpoint, "posting query");
            match self.post_once(query) {
                Ok(envelope) => return Ok(envelope),
                Err(e) if e.is_application_error() => return Err(e),
                Err(e) if attempt >= self.max_attempts => {
                    error!(%correlation, attempt, "giving up: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(%correlation, attempt, "attempt failed: {}", e);
                    attempt += 1;
                }
            }
        }
    }

    fn post_once(&self, query: &str) -> ClientResult<ResponseEnvelope> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": query }))
            .send()
            .map_err(|e| ClientError::Transport(format!("request failed: {}", e)))?;

        let status = response.status();
        let headers = collect_headers(response.headers());
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(ClientError::Transport(format!(
                "request failed with status {}: {}",
                status, text
            )));
        }
        let body: Value = response
            .json()
            .map_err(|e| ClientError::Parse(format!("invalid response body: {}", e)))?;
        Ok(ResponseEnvelope::from_body(body, headers))
    }
}

fn collect_headers(headers: &reqwest::header::HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.to_string(), v.to_string()))
        })
        .collect()
}

fn apply_config(
    mut builder: reqwest::ClientBuilder,
    config: &ClientConfig,
) -> ClientResult<reqwest::ClientBuilder> {
    builder = builder
        .timeout(config.limits.request_timeout)
        .tcp_keepalive(Duration::from_secs(KEEPALIVE_SECS));

    match &config.tls {
        TlsMode::Default => {}
        TlsMode::Insecure => {
            warn!("certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        TlsMode::VerifyWithBundle(path) => {
            let pem = std::fs::read(path).map_err(|e| {
                ClientError::Transport(format!(
                    "cannot read certificate bundle {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ClientError::Transport(format!("invalid certificate bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
    }

    if let Some(token) = &config.bearer_token {
        let mut headers = reqwest::header::HeaderMap::new();
        let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ClientError::Transport(format!("invalid bearer token: {}", e)))?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }

    if let Some(proxy_config) = &config.proxy {
        builder = builder.proxy(build_proxy(proxy_config)?);
    }

    Ok(builder)
}

fn apply_blocking_config(
    mut builder: reqwest::blocking::ClientBuilder,
    config: &ClientConfig,
) -> ClientResult<reqwest::blocking::ClientBuilder> {
    builder = builder
        .timeout(config.limits.request_timeout)
        .tcp_keepalive(Duration::from_secs(KEEPALIVE_SECS));

    match &config.tls {
        TlsMode::Default => {}
        TlsMode::Insecure => {
            warn!("certificate verification disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        TlsMode::VerifyWithBundle(path) => {
            let pem = std::fs::read(path).map_err(|e| {
                ClientError::Transport(format!(
                    "cannot read certificate bundle {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| ClientError::Transport(format!("invalid certificate bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
    }

    if let Some(token) = &config.bearer_token {
        let mut headers = reqwest::header::HeaderMap::new();
        let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ClientError::Transport(format!("invalid bearer token: {}", e)))?;
        headers.insert(reqwest::header::AUTHORIZATION, value);
        builder = builder.default_headers(headers);
    }

    if let Some(proxy_config) = &config.proxy {
        builder = builder.proxy(build_proxy(proxy_config)?);
    }

    Ok(builder)
}

fn build_proxy(config: &crate::config::ProxyConfig) -> ClientResult<reqwest::Proxy> {
    let mut proxy = reqwest::Proxy::all(&config.url)
        .map_err(|e| ClientError::Transport(format!("invalid proxy url: {}", e)))?;
    if let (Some(user), Some(password)) = (&config.username, &config.password) {
        proxy = proxy.basic_auth(user, password);
    }
    if let Some(no_proxy) = &config.no_proxy {
        proxy = proxy.no_proxy(reqwest::NoProxy::from_string(no_proxy));
    }
    Ok(proxy)
}
