//! Network client (component B): a thin, structured wrapper around a single
//! shared `reqwest::Client`.
//!
//! No retries happen unless the caller passes `RequestOptions::retry`, and
//! retries are only ever applied by this module to `GET`/`HEAD` (the two
//! idempotent methods the engine itself issues); a caller-supplied retry
//! policy for other methods is the caller's responsibility.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::EngineError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const NONE: RetryPolicy = RetryPolicy { max_attempts: 1, backoff: Duration::ZERO };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::NONE
    }
}

#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub retry: RetryPolicy,
    pub parse_json: bool,
}

/// A response body: either raw bytes or a decoded JSON value, never both.
#[derive(Debug)]
pub enum Body {
    Bytes(Vec<u8>),
    Json(Value),
}

impl Body {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Body::Bytes(b) => b,
            Body::Json(v) => serde_json::to_vec(&v).unwrap_or_default(),
        }
    }
}

pub struct Response {
    pub status: u16,
    pub body: Body,
}

/// Shared HTTP client. Built once per process (connection pooling); `rustls`
/// TLS backend so the engine never negotiates plaintext for an `https://`
/// manifest host.
#[derive(Clone)]
pub struct NetworkClient {
    client: reqwest::Client,
    default_headers: HashMap<String, String>,
}

impl NetworkClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("reqwest client builder should not fail with default settings"),
            default_headers: HashMap::new(),
        }
    }

    pub fn with_default_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    pub async fn request(
        &self,
        url: &str,
        method: Method,
        body: Option<Vec<u8>>,
        headers: &HashMap<String, String>,
        options: &RequestOptions,
    ) -> Result<Response, EngineError> {
        let attempts = if matches!(method, Method::GET | Method::HEAD) {
            options.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut last_err = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                tokio::time::sleep(options.retry.backoff * attempt).await;
                tracing::debug!(url, attempt, "retrying request");
            }
            match self.try_once(url, method.clone(), body.clone(), headers, options).await {
                Ok(response) => return Ok(response),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap())
    }

    async fn try_once(
        &self,
        url: &str,
        method: Method,
        body: Option<Vec<u8>>,
        headers: &HashMap<String, String>,
        options: &RequestOptions,
    ) -> Result<Response, EngineError> {
        let started = std::time::Instant::now();
        let mut builder = self.client.request(method, url);
        for (k, v) in self.default_headers.iter().chain(headers.iter()) {
            builder = builder.header(k, v);
        }
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| EngineError::Network {
            http_status: e.status().map(|s| s.as_u16()),
            transport_kind: transport_kind(&e),
        })?;

        let status = response.status();
        tracing::debug!(url, status = status.as_u16(), elapsed_ms = started.elapsed().as_millis() as u64, "http request completed");

        if !status.is_success() {
            let excerpt = response.text().await.unwrap_or_default();
            return Err(EngineError::Network {
                http_status: Some(status.as_u16()),
                transport_kind: excerpt.chars().take(200).collect(),
            });
        }

        let body = if options.parse_json {
            let value: Value = response.json().await.map_err(|e| EngineError::Decode {
                field_path: "$".into(),
                reason: e.to_string(),
            })?;
            Body::Json(value)
        } else {
            let bytes = response.bytes().await.map_err(|e| EngineError::Network {
                http_status: None,
                transport_kind: e.to_string(),
            })?;
            Body::Bytes(bytes.to_vec())
        };

        Ok(Response { status: status.as_u16(), body })
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, headers: &HashMap<String, String>) -> Result<T, EngineError> {
        let options = RequestOptions { parse_json: true, ..Default::default() };
        let response = self.request(url, Method::GET, None, headers, &options).await?;
        match response.body {
            Body::Json(value) => serde_path_to_error::deserialize(value).map_err(|e| EngineError::Decode {
                field_path: e.path().to_string(),
                reason: e.to_string(),
            }),
            Body::Bytes(_) => unreachable!("parse_json was requested"),
        }
    }

    pub(crate) fn raw(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_kind(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timeout".into()
    } else if e.is_connect() {
        "connect".into()
    } else if e.is_decode() {
        "decode".into()
    } else {
        "other".into()
    }
}
