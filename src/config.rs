use reqwest::header::{HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::error::ConfigError;
use crate::http::{Sleeper, Transport};
use crate::quota::QuotaHeaderNames;

pub const DEFAULT_TIMEOUT_MS: i64 = 30_000;
pub const DEFAULT_RETRIES: i64 = 3;

/// One of the two supported delivery services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Agent {
    Yalidine,
    Guepex,
}

impl Agent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Agent::Yalidine => "yalidine",
            Agent::Guepex => "guepex",
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            Agent::Yalidine => "https://api.yalidine.app/v1/",
            Agent::Guepex => "https://api.guepex.app/v1/",
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Agent {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yalidine" => Ok(Agent::Yalidine),
            "guepex" => Ok(Agent::Guepex),
            _ => Err(ConfigError::UnknownAgent(s.to_string())),
        }
    }
}

/// Header names agreed with the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderNames {
    pub api_id: HeaderName,
    pub api_token: HeaderName,
    pub retry_after: HeaderName,
    pub quota: QuotaHeaderNames,
}

impl Default for HeaderNames {
    fn default() -> Self {
        Self {
            api_id: HeaderName::from_static("x-api-id"),
            api_token: HeaderName::from_static("x-api-token"),
            retry_after: HeaderName::from_static("retry-after"),
            quota: QuotaHeaderNames::default(),
        }
    }
}

/// Raw session input. Nothing here is trusted until [`SessionOptions::validate`].
#[derive(Clone, Default)]
pub struct SessionOptions {
    pub agent: String,
    pub api_id: String,
    pub api_token: String,
    pub base_url: Option<String>,
    pub timeout_ms: Option<i64>,
    pub retries: Option<i64>,
    pub debug: bool,
    pub disable_cache: bool,
    pub headers: HeaderNames,
    pub cache: Option<Arc<dyn CacheStore>>,
    pub transport: Option<Arc<dyn Transport>>,
    pub sleeper: Option<Arc<dyn Sleeper>>,
    pub clock: Option<Arc<dyn Clock>>,
}

impl fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOptions")
            .field("agent", &self.agent)
            .field("api_id", &self.api_id)
            .field("api_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("retries", &self.retries)
            .field("debug", &self.debug)
            .field("disable_cache", &self.disable_cache)
            .field("cache", &self.cache.is_some())
            .field("transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

impl SessionOptions {
    pub fn new(
        agent: impl Into<String>,
        api_id: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            api_id: api_id.into(),
            api_token: api_token.into(),
            ..Self::default()
        }
    }

    /// Load options from environment.
    ///
    /// Env vars:
    /// - YALIDINE_AGENT (default: yalidine)
    /// - YALIDINE_API_ID, YALIDINE_API_TOKEN [required at validation]
    /// - YALIDINE_API_URL (default: per-agent base URL)
    /// - YALIDINE_TIMEOUT_MS (default: 30000)
    /// - YALIDINE_RETRIES (default: 3)
    /// - YALIDINE_DEBUG (1/true enables request logging)
    /// - YALIDINE_DISABLE_CACHE (1/true skips reference caching in `init`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let agent = env::var("YALIDINE_AGENT").unwrap_or_else(|_| "yalidine".to_string());
        let api_id = env::var("YALIDINE_API_ID").unwrap_or_default();
        let api_token = env::var("YALIDINE_API_TOKEN").unwrap_or_default();
        let base_url = env::var("YALIDINE_API_URL").ok().filter(|s| !s.is_empty());
        let timeout_ms = env_number("YALIDINE_TIMEOUT_MS")?;
        let retries = env_number("YALIDINE_RETRIES")?;
        let debug = env_flag("YALIDINE_DEBUG");
        let disable_cache = env_flag("YALIDINE_DISABLE_CACHE");
        Ok(Self {
            agent,
            api_id,
            api_token,
            base_url,
            timeout_ms,
            retries,
            debug,
            disable_cache,
            ..Self::default()
        })
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn timeout_ms(mut self, ms: i64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn retries(mut self, n: i64) -> Self {
        self.retries = Some(n);
        self
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }

    pub fn disable_cache(mut self, off: bool) -> Self {
        self.disable_cache = off;
        self
    }

    pub fn headers(mut self, names: HeaderNames) -> Self {
        self.headers = names;
        self
    }

    pub fn cache(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Check every constraint in order and resolve defaults.
    pub fn validate(&self) -> Result<Config, ConfigError> {
        let agent: Agent = self.agent.parse()?;
        if self.api_id.trim().is_empty() {
            return Err(ConfigError::MissingApiId);
        }
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::MissingApiToken);
        }
        let api_id = HeaderValue::from_str(&self.api_id)
            .map_err(|_| ConfigError::InvalidCredential("api_id"))?;
        let mut api_token = HeaderValue::from_str(&self.api_token)
            .map_err(|_| ConfigError::InvalidCredential("api_token"))?;
        api_token.set_sensitive(true);

        let timeout_ms = self.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        if timeout_ms <= 0 {
            return Err(ConfigError::InvalidTimeout(timeout_ms));
        }
        let retries = self.retries.unwrap_or(DEFAULT_RETRIES);
        if retries < 0 {
            return Err(ConfigError::InvalidRetries(retries));
        }
        let retries = u32::try_from(retries).map_err(|_| ConfigError::InvalidRetries(retries))?;

        let raw_url = self.base_url.as_deref().unwrap_or(agent.base_url());
        let base_url = parse_base_url(raw_url)?;

        Ok(Config {
            agent,
            api_id,
            api_token,
            base_url,
            timeout: Duration::from_millis(timeout_ms as u64),
            retries,
            debug: self.debug,
            cache_disabled: self.disable_cache,
            user_agent: default_user_agent(),
            headers: self.headers.clone(),
        })
    }
}

/// Validated, immutable session configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub agent: Agent,
    pub api_id: HeaderValue,
    pub api_token: HeaderValue,
    pub base_url: Url,
    pub timeout: Duration,
    pub retries: u32,
    pub debug: bool,
    pub cache_disabled: bool,
    pub user_agent: String,
    pub headers: HeaderNames,
}

pub fn default_user_agent() -> String {
    format!(
        "yalidine-client/{} (+https://github.com/HautechAI/yalidine-client)",
        env!("CARGO_PKG_VERSION")
    )
}

// Endpoints are joined relative to the base, so the path must end with '/'.
fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|e| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidBaseUrl {
            url: raw.to_string(),
            reason: "not a base url".into(),
        });
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn env_flag(var: &str) -> bool {
    env::var(var)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn env_number(var: &'static str) -> Result<Option<i64>, ConfigError> {
    match env::var(var) {
        Ok(v) if v.trim().is_empty() => Ok(None),
        Ok(v) => v
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: v }),
        Err(_) => Ok(None),
    }
}
