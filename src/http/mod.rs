mod transport;

pub use transport::{
    build_client, ReqwestTransport, Sleeper, TokioSleeper, Transport, TransportError,
    TransportRequest, TransportResponse,
};

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::quota::QuotaTracker;
use crate::types::QuotaStatus;

pub const BACKOFF_BASE_MS: u64 = 1_000;
pub const BACKOFF_CAP_MS: u64 = 10_000;
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// One logical call. Timeout and retry count fall back to the engine's
/// defaults when unset.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl RequestContext {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            max_retries: None,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::GET, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::POST, endpoint)
    }

    pub fn patch(endpoint: impl Into<String>) -> Self {
        Self::new(Method::PATCH, endpoint)
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(Method::DELETE, endpoint)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse<T = Value> {
    pub data: T,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub quota: QuotaStatus,
}

impl ApiResponse<Value> {
    /// Convert the payload into a typed value. A shape mismatch is reported as
    /// an API error carrying the raw payload.
    pub fn decode<T: DeserializeOwned>(self) -> Result<ApiResponse<T>> {
        let ApiResponse {
            data,
            status,
            headers,
            quota,
        } = self;
        match T::deserialize(&data) {
            Ok(decoded) => Ok(ApiResponse {
                data: decoded,
                status,
                headers,
                quota,
            }),
            Err(e) => Err(Error::Api {
                status,
                message: format!("unexpected response shape: {}", e),
                body: data,
            }),
        }
    }
}

/// Credential, content-type and user-agent headers sent on every request.
pub fn default_headers(cfg: &Config) -> HeaderMap {
    let mut h = HeaderMap::new();
    h.insert(cfg.headers.api_id.clone(), cfg.api_id.clone());
    h.insert(cfg.headers.api_token.clone(), cfg.api_token.clone());
    h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(ua) = HeaderValue::from_str(&cfg.user_agent) {
        h.insert(USER_AGENT, ua);
    }
    h
}

/// Defaults first, then overrides. A name present in `overrides` replaces
/// every default value under that name.
pub fn merge_headers(defaults: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut merged = defaults.clone();
    for name in overrides.keys() {
        merged.remove(name);
    }
    for (name, value) in overrides {
        merged.append(name.clone(), value.clone());
    }
    merged
}

pub fn compose_url(base: &Url, endpoint: &str, query: &[(String, String)]) -> Result<Url> {
    if endpoint.contains("://") {
        return Err(Error::InvalidRequest(format!(
            "endpoint must be relative to the base url: {}",
            endpoint
        )));
    }
    let mut url = base
        .join(endpoint.trim_start_matches('/'))
        .map_err(|e| Error::InvalidRequest(format!("bad endpoint `{}`: {}", endpoint, e)))?;
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    Ok(url)
}

/// `min(1000ms * 2^attempt, 10s)`.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).min(BACKOFF_CAP_MS))
}

pub fn parse_retry_after(headers: &HeaderMap, name: &HeaderName) -> Duration {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

/// Empty body is a null payload; anything else must be JSON. On failure the
/// raw text is returned.
pub fn parse_body(body: &[u8]) -> std::result::Result<Value, String> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|_| String::from_utf8_lossy(body).into_owned())
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<Value>,
}

fn error_message(status: StatusCode, body: &Value) -> String {
    let from_body = ErrorBody::deserialize(body).ok().and_then(|b| {
        b.message.or_else(|| match b.error {
            Some(Value::String(s)) => Some(s),
            Some(Value::Object(o)) => o.get("message").and_then(|m| m.as_str()).map(String::from),
            _ => None,
        })
    });
    from_body.unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
}

pub struct RequestEngine {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    quota: Arc<QuotaTracker>,
    base_url: Url,
    default_headers: HeaderMap,
    retry_after: HeaderName,
    timeout: Duration,
    max_retries: u32,
    debug: bool,
}

impl RequestEngine {
    pub fn new(
        cfg: &Config,
        transport: Arc<dyn Transport>,
        sleeper: Arc<dyn Sleeper>,
        quota: Arc<QuotaTracker>,
    ) -> Self {
        Self {
            transport,
            sleeper,
            quota,
            base_url: cfg.base_url.clone(),
            default_headers: default_headers(cfg),
            retry_after: cfg.headers.retry_after.clone(),
            timeout: cfg.timeout,
            max_retries: cfg.retries,
            debug: cfg.debug,
        }
    }

    pub fn quota(&self) -> &Arc<QuotaTracker> {
        &self.quota
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Run one call. Only timeouts and network failures are retried, with
    /// capped exponential backoff; every response updates the quota tracker.
    pub async fn execute(&self, ctx: RequestContext) -> Result<ApiResponse<Value>> {
        let url = compose_url(&self.base_url, &ctx.endpoint, &ctx.query)?;
        let headers = merge_headers(&self.default_headers, &ctx.headers);
        let body = match &ctx.body {
            Some(v) => Some(
                serde_json::to_vec(v)
                    .map_err(|e| Error::InvalidRequest(format!("body not serializable: {}", e)))?,
            ),
            None => None,
        };
        let timeout = ctx.timeout.unwrap_or(self.timeout);
        if timeout.is_zero() {
            return Err(Error::InvalidRequest("timeout must be positive".into()));
        }
        let max_retries = ctx.max_retries.unwrap_or(self.max_retries);

        let mut last_error: Option<Error> = None;
        for attempt in 0..=max_retries {
            if self.debug {
                debug!(
                    "{} {} attempt {}/{} body={}",
                    ctx.method,
                    url,
                    attempt + 1,
                    max_retries.saturating_add(1),
                    ctx.body.as_ref().map(|b| b.to_string()).unwrap_or_default()
                );
            }
            let request = TransportRequest {
                method: ctx.method.clone(),
                url: url.clone(),
                headers: headers.clone(),
                body: body.clone(),
            };
            let failure = match tokio::time::timeout(timeout, self.transport.send(request)).await {
                Ok(Ok(response)) => return self.interpret(&ctx.method, &url, response),
                Ok(Err(TransportError::Timeout)) | Err(_) => Error::Timeout { timeout },
                Ok(Err(TransportError::Network(message))) => Error::Network { message },
            };
            if attempt < max_retries {
                let delay = backoff_delay(attempt);
                warn!(
                    "{} {} failed ({}), retrying in {:?} (attempt {}/{})",
                    ctx.method,
                    url,
                    failure,
                    delay,
                    attempt + 1,
                    max_retries.saturating_add(1)
                );
                self.sleeper.sleep(delay).await;
            }
            last_error = Some(failure);
        }
        Err(last_error.unwrap_or_else(|| Error::Network {
            message: format!("{} {} failed without a recorded error", ctx.method, url),
        }))
    }

    fn interpret(
        &self,
        method: &Method,
        url: &Url,
        response: TransportResponse,
    ) -> Result<ApiResponse<Value>> {
        let quota = self.quota.record_headers(&response.headers);
        let status = response.status;
        let parsed = parse_body(&response.body);
        if self.debug {
            debug!(
                "{} {} -> {} (quota left: second={} day={}) body={}",
                method,
                url,
                status,
                quota.per_second,
                quota.per_day,
                match &parsed {
                    Ok(v) => v.to_string(),
                    Err(raw) => raw.clone(),
                }
            );
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(&response.headers, &self.retry_after);
            return Err(Error::RateLimited { retry_after, quota });
        }
        let data = match parsed {
            Ok(v) => v,
            Err(raw) => {
                return Err(Error::Api {
                    status,
                    message: "response body is not valid JSON".into(),
                    body: Value::String(raw),
                })
            }
        };
        if !status.is_success() {
            return Err(Error::Api {
                status,
                message: error_message(status, &data),
                body: data,
            });
        }
        Ok(ApiResponse {
            data,
            status,
            headers: response.headers,
            quota,
        })
    }
}
