use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::cache::{cache_key, CacheStore, MemoryCacheStore};
use crate::clock::{Clock, SystemClock};
use crate::config::{Agent, Config, SessionOptions};
use crate::error::{Error, Result};
use crate::http::{
    build_client, ApiResponse, RequestContext, RequestEngine, ReqwestTransport, Sleeper,
    TokioSleeper, Transport,
};
use crate::quota::QuotaTracker;
use crate::types::QuotaStatus;

pub const REFERENCE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Reference datasets cached by `init`: (cache resource, endpoint).
pub const REFERENCE_DATASETS: &[(&str, &str)] = &[("wilayas", "wilayas/")];

/// Entry point for callers: owns one engine and one cache store bound to a
/// validated configuration.
pub struct Session {
    config: Config,
    engine: RequestEngine,
    cache: Arc<dyn CacheStore>,
    initialized: Mutex<bool>,
}

impl Session {
    /// Validate options and wire collaborators. Fails before any network or
    /// cache access.
    pub fn new(options: SessionOptions) -> Result<Self> {
        let config = options.validate()?;
        let clock: Arc<dyn Clock> = options.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let transport: Arc<dyn Transport> = match options.transport {
            Some(t) => t,
            None => {
                let client = build_client(&config.user_agent)
                    .map_err(|e| Error::Initialization(format!("http client: {}", e)))?;
                Arc::new(ReqwestTransport::new(client))
            }
        };
        let sleeper: Arc<dyn Sleeper> = options.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper));
        let cache: Arc<dyn CacheStore> = options
            .cache
            .unwrap_or_else(|| Arc::new(MemoryCacheStore::with_clock(clock.clone())));
        let quota = Arc::new(QuotaTracker::new(config.headers.quota.clone(), clock));
        let engine = RequestEngine::new(&config, transport, sleeper, quota);
        debug!("session created for {} at {}", config.agent, config.base_url);
        Ok(Self {
            config,
            engine,
            cache,
            initialized: Mutex::new(false),
        })
    }

    pub fn agent(&self) -> Agent {
        self.config.agent
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn engine(&self) -> &RequestEngine {
        &self.engine
    }

    pub fn quota_status(&self) -> QuotaStatus {
        self.engine.quota().current_status()
    }

    pub fn can_make_request(&self) -> bool {
        self.engine.quota().can_proceed()
    }

    /// Handle on the cache store.
    pub fn database(&self) -> Arc<dyn CacheStore> {
        self.cache.clone()
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.lock().await
    }

    /// Warm the cache with reference datasets, unless caching is disabled.
    /// Runs once; later calls return immediately. Fetch and store failures are logged and skipped, but a
    /// store that cannot even be queried fails the call.
    pub async fn init(&self) -> Result<()> {
        let mut initialized = self.initialized.lock().await;
        if *initialized {
            return Ok(());
        }
        if self.config.cache_disabled {
            debug!("reference caching disabled; skipping warm-up");
            *initialized = true;
            return Ok(());
        }
        for (resource, endpoint) in REFERENCE_DATASETS {
            let key = cache_key(self.config.agent.as_str(), resource);
            let present = self
                .cache
                .has(&key)
                .await
                .map_err(|e| Error::Initialization(format!("cache unavailable: {}", e)))?;
            if present {
                debug!("{} already cached", key);
                continue;
            }
            match self.engine.execute(RequestContext::get(*endpoint)).await {
                Ok(resp) => {
                    if let Err(e) = self.cache.set_value(&key, resp.data, Some(REFERENCE_TTL)).await {
                        warn!("caching {} failed: {}", key, e);
                    }
                }
                Err(e) => warn!("fetching {} for cache failed: {}", resource, e),
            }
        }
        *initialized = true;
        info!("{} session initialized", self.config.agent);
        Ok(())
    }

    /// Check the remote service is reachable. Any failure reads as `false`.
    pub async fn test_connection(&self) -> bool {
        let ctx = RequestContext::get("wilayas/")
            .query("page_size", "1")
            .max_retries(0);
        match self.engine.execute(ctx).await {
            Ok(_) => true,
            Err(e) => {
                debug!("connection test failed: {}", e);
                false
            }
        }
    }

    /// Release the cache store's background resources. Safe to repeat.
    pub async fn destroy(&self) {
        self.cache.destroy().await;
        *self.initialized.lock().await = false;
    }

    pub async fn execute(&self, ctx: RequestContext) -> Result<ApiResponse<Value>> {
        self.engine.execute(ctx).await
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiResponse<T>> {
        self.execute(RequestContext::get(endpoint)).await?.decode()
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiResponse<T>> {
        let ctx = RequestContext::post(endpoint).json(to_body(body)?);
        self.execute(ctx).await?.decode()
    }

    pub async fn patch<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<ApiResponse<T>> {
        let ctx = RequestContext::patch(endpoint).json(to_body(body)?);
        self.execute(ctx).await?.decode()
    }

    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ApiResponse<T>> {
        self.execute(RequestContext::delete(endpoint)).await?.decode()
    }
}

fn to_body<B: Serialize>(body: &B) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| Error::InvalidRequest(format!("body not serializable: {}", e)))
}
